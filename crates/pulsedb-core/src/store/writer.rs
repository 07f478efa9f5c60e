//! Gap-filling write path.
//!
//! Readings arrive as monotonically growing pulse counts, usually one per
//! minute but with arbitrary holes when a device was offline. A write lands
//! on the slot of its own minute; any hole since the previous valid slot is
//! filled in the same pass by spreading the pulse delta evenly across the
//! missing minutes. Interpolated slots keep the sentinel raw value and a
//! quality index encoding how wide the hole was, so reports can tell
//! measured data from reconstructed data.

use std::io::{Seek, SeekFrom, Write};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::layout::{classify_offset, SlotPosition};
use crate::record::{Precision, SlotRecord, RECORD_LEN, SENTINEL_RAW};
use crate::time::{epoch_floor, rounded_minutes_between, truncate_to_minute, FUTURE_WINDOW_MINUTES};

use super::MinuteStore;

impl MinuteStore {
    /// Records the raw pulse count read from a counter at `at`.
    ///
    /// The reading is stored in the slot of its minute. When the previous
    /// valid slot is more than one minute back, the pulse delta is spread
    /// evenly over the intervening slots (earlier slots take the division
    /// remainder first) and each of them is marked with a quality index of
    /// `round(log10(gap) * 10000)`.
    ///
    /// `pulses_per_unit` and `currency_per_unit` default to 1 when zero.
    /// `previous` short-circuits the backward scan for callers feeding
    /// sequential readings: pass the record returned by the last call.
    ///
    /// Returns the record written for `at`'s minute. `Ok(None)` means the
    /// write was skipped: the timestamp fell outside the allowed window, or
    /// it was not later than the newest stored reading.
    ///
    /// # Errors
    ///
    /// [`Error::OffsetOutOfBounds`] when the minute falls outside the
    /// file's range in a way growth cannot fix (before the start), plus any
    /// I/O or lock failure.
    pub fn set_value(
        &mut self,
        at: DateTime<Utc>,
        raw_value: u64,
        pulses_per_unit: f64,
        currency_per_unit: f64,
        previous: Option<&SlotRecord>,
    ) -> Result<Option<SlotRecord>> {
        let minute = truncate_to_minute(at);
        if !write_window_allows(minute) {
            debug!(at = %at, "measurement outside the allowed time window, ignored");
            return Ok(None);
        }

        #[allow(clippy::float_cmp)] // zero is the "not configured" marker, never computed
        let pulses_per_unit = if pulses_per_unit == 0.0 {
            1.0
        } else {
            pulses_per_unit
        };
        #[allow(clippy::float_cmp)]
        let currency_per_unit = if currency_per_unit == 0.0 {
            1.0
        } else {
            currency_per_unit
        };

        let header = self.ensure_capacity_for(minute)?;
        let SlotPosition::InRange(offset) = classify_offset(&header, minute) else {
            return Err(Error::OffsetOutOfBounds { timestamp: minute });
        };

        // The carried record keeps the caller's original timestamp, which may
        // have seconds; the gap is the rounded minute delta between the two
        // readings, not between their slots.
        let previous = match previous {
            Some(record) => Some((*record, rounded_minutes_between(record.timestamp, at))),
            None => self.scan_previous(minute)?,
        };

        let Some((prev, distance)) = previous else {
            // First reading ever: the raw count itself is the consumption.
            let record = first_record(
                minute,
                raw_value,
                pulses_per_unit,
                currency_per_unit,
                self.options.precision,
            );
            self.write_run(offset, std::slice::from_ref(&record))?;
            return Ok(Some(SlotRecord {
                timestamp: at,
                ..record
            }));
        };

        if distance <= 0 {
            warn!(
                path = %self.path.display(),
                at = %minute,
                newest = %prev.timestamp,
                distance,
                "write at or before the newest stored reading, skipped"
            );
            return Ok(None);
        }

        let span = distance.unsigned_abs();
        let run_start = minute - Duration::minutes(distance - 1);
        let SlotPosition::InRange(run_offset) = classify_offset(&header, run_start) else {
            return Err(Error::OffsetOutOfBounds {
                timestamp: run_start,
            });
        };

        let records = interpolated_run(
            &prev,
            run_start,
            span,
            raw_value,
            pulses_per_unit,
            currency_per_unit,
            self.options.precision,
        );
        self.write_run(run_offset, &records)?;

        let last = records[records.len() - 1];
        Ok(Some(SlotRecord {
            timestamp: at,
            ..last
        }))
    }

    /// Rewrites every slot from `from` to the end of the file back to the
    /// untouched pattern, erasing measurements and interpolations alike.
    ///
    /// A missing file or an out-of-range `from` is a logged no-op; this is
    /// the one sanctioned way to take stored data back.
    ///
    /// # Errors
    ///
    /// I/O or lock failures while rewriting.
    pub fn reinitialize_slots(&mut self, from: DateTime<Utc>) -> Result<()> {
        let minute = truncate_to_minute(from);
        let Some(header) = self.load_header()? else {
            debug!(path = %self.path.display(), "nothing to re-initialize, no file");
            return Ok(());
        };
        let SlotPosition::InRange(offset) = classify_offset(&header, minute) else {
            debug!(
                path = %self.path.display(),
                from = %minute,
                "re-initialization start outside the stored range, skipped"
            );
            return Ok(());
        };

        info!(
            path = %self.path.display(),
            from = %minute,
            until = %header.end,
            "re-initializing slots to untouched"
        );
        self.fill_untouched_span(offset, header.file_len())?;
        self.handles.flush()
    }

    /// Encodes `records`, writes them as one contiguous span starting at
    /// `offset` and syncs the file.
    fn write_run(&mut self, offset: u64, records: &[SlotRecord]) -> Result<()> {
        let mut buf = Vec::with_capacity(records.len() * RECORD_LEN);
        for record in records {
            buf.extend_from_slice(&record.to_bytes());
        }
        let file = self.handles.writer()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&buf)?;
        self.sector.invalidate();
        self.handles.flush()
    }
}

fn write_window_allows(minute: DateTime<Utc>) -> bool {
    minute >= epoch_floor() && minute <= Utc::now() + Duration::minutes(FUTURE_WINDOW_MINUTES)
}

/// Builds the record for a store's very first reading.
fn first_record(
    minute: DateTime<Utc>,
    raw_value: u64,
    pulses_per_unit: f64,
    currency_per_unit: f64,
    precision: Precision,
) -> SlotRecord {
    let energy = precision.scale_pulses(raw_value, pulses_per_unit);
    SlotRecord {
        raw: raw_value,
        energy: precision.truncate_scaled(energy),
        cost: precision.truncate_scaled(energy * currency_per_unit),
        quality: 0,
        timestamp: minute,
    }
}

/// Builds the `span` records covering `[run_start, run_start + span)`.
///
/// The pulse delta since `prev` is split into per-minute shares,
/// `delta / span` each, with the remainder going to the earliest slots one
/// extra pulse apiece. Energy and cost accumulate share by share on top of
/// `prev`'s totals so the series stays continuous. All slots except the
/// last keep the sentinel raw value and the gap quality index; the last
/// carries the reading itself.
///
/// A negative pulse delta (counter reset, or `prev` itself interpolated)
/// is floored at zero, so the run repeats `prev`'s totals unchanged.
fn interpolated_run(
    prev: &SlotRecord,
    run_start: DateTime<Utc>,
    span: u64,
    raw_value: u64,
    pulses_per_unit: f64,
    currency_per_unit: f64,
    precision: Precision,
) -> Vec<SlotRecord> {
    let delta = raw_value.saturating_sub(prev.raw);
    let average = delta / span;
    let remainder = delta % span;
    let gap_quality = quality_for_gap(span);

    #[allow(clippy::cast_precision_loss)] // scaled totals stay far below 2^52
    let (mut energy, mut cost) = (prev.energy as f64, prev.cost as f64);

    let mut records = Vec::with_capacity(usize::try_from(span).unwrap_or(0));
    let mut minute = run_start;
    for i in 0..span {
        let share = average + u64::from(i < remainder);
        let pulses = precision.scale_pulses(share, pulses_per_unit);
        energy += pulses;
        cost += pulses * currency_per_unit;

        let is_last = i + 1 == span;
        records.push(SlotRecord {
            raw: if is_last { raw_value } else { SENTINEL_RAW },
            energy: precision.truncate_scaled(energy),
            cost: precision.truncate_scaled(cost),
            quality: if is_last { 0 } else { gap_quality },
            timestamp: minute,
        });
        minute += Duration::minutes(1);
    }
    records
}

/// Quality index for slots reconstructed across a gap of `span` minutes.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)] // float-to-int `as` saturates, which is exactly the clamp wanted here
fn quality_for_gap(span: u64) -> u16 {
    ((span as f64).log10() * 10_000.0).round() as u16
}
