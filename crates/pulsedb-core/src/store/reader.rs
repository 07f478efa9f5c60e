//! Read and query path.
//!
//! Point reads are non-throwing by design: anything that keeps a single
//! slot from being read (except a truncated file, which means the header
//! lies about the range) is logged and surfaced as "no value", so report
//! builders iterating thousands of minutes never trip over one bad read.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::layout::{classify_offset, SlotPosition};
use crate::record::{SlotRecord, SENTINEL_RAW};
use crate::series::{delta, SeriesUnit, TimeBucket};
use crate::time::{minutes_between, truncate_to_minute, FUTURE_WINDOW_MINUTES};

use super::MinuteStore;

/// Which way [`MinuteStore::get_closest_value`] walks when the requested
/// slot has no usable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Towards newer slots.
    Forward,
    /// Towards older slots.
    Backward,
}

impl MinuteStore {
    /// Returns the slot covering `at`, stamped with `at`.
    ///
    /// `Ok(None)` when `at` falls outside `[start, end)`, beyond the
    /// allowed future window, or the slot could not be read.
    ///
    /// # Errors
    ///
    /// Only a file physically shorter than its header claims; every other
    /// read problem is logged and reported as `Ok(None)`.
    pub fn get_value(&mut self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        let minute = truncate_to_minute(at);
        if minute > Utc::now() + Duration::minutes(FUTURE_WINDOW_MINUTES) {
            return Ok(None);
        }
        let Some(header) = self.load_header()? else {
            return Ok(None);
        };
        let SlotPosition::InRange(offset) = classify_offset(&header, minute) else {
            return Ok(None);
        };

        match self.read_slot(offset, at) {
            Ok(record) => Ok(Some(record)),
            Err(err) => self.soften_read_error(err),
        }
    }

    /// Walks backward from the minute before `at`, returning the first
    /// valid slot together with the distance walked in minutes.
    ///
    /// Interpolated slots count as valid unless overwriting is allowed,
    /// since their running totals are good delta bases.
    pub(crate) fn scan_previous(
        &mut self,
        at: DateTime<Utc>,
    ) -> Result<Option<(SlotRecord, i64)>> {
        let Some(header) = self.load_header()? else {
            return Ok(None);
        };
        let overwrite_allowed = self.options.overwrite_allowed;
        let from = truncate_to_minute(at);
        let mut cursor = from - Duration::minutes(1);
        loop {
            let SlotPosition::InRange(offset) = classify_offset(&header, cursor) else {
                return Ok(None);
            };
            let record = self.read_slot(offset, cursor)?;
            if record.is_valid(overwrite_allowed) {
                return Ok(Some((record, minutes_between(cursor, from))));
            }
            cursor -= Duration::minutes(1);
        }
    }

    /// The nearest valid slot strictly before `at`.
    ///
    /// # Errors
    ///
    /// Same error policy as [`get_value`](Self::get_value).
    pub fn find_previous(&mut self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        match self.scan_previous(at) {
            Ok(found) => Ok(found.map(|(record, _)| record)),
            Err(err) => self.soften_read_error(err),
        }
    }

    /// The nearest directly measured slot at or after `at`.
    ///
    /// Unlike the backward scan this skips interpolated slots: walking
    /// forward, only a slot with a real raw reading ends the search.
    ///
    /// # Errors
    ///
    /// Same error policy as [`get_value`](Self::get_value).
    pub fn find_next(&mut self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        let mut cursor = truncate_to_minute(at);
        while let Some(record) = self.get_value(cursor)? {
            if record.raw < SENTINEL_RAW {
                return Ok(Some(record));
            }
            cursor += Duration::minutes(1);
        }
        Ok(None)
    }

    /// The slot at `at` when it holds usable data, otherwise the nearest
    /// one in `direction`.
    ///
    /// # Errors
    ///
    /// Same error policy as [`get_value`](Self::get_value).
    pub fn get_closest_value(
        &mut self,
        at: DateTime<Utc>,
        direction: ScanDirection,
    ) -> Result<Option<SlotRecord>> {
        let overwrite_allowed = self.options.overwrite_allowed;
        if let Some(record) = self.get_value(at)? {
            if record.is_valid(overwrite_allowed) {
                return Ok(Some(record));
            }
        }
        match direction {
            ScanDirection::Forward => self.find_next(at),
            ScanDirection::Backward => self.find_previous(at),
        }
    }

    /// Total consumption between `begin` and `end`, expressed in `unit`.
    ///
    /// Both bounds are clamped into the stored range, capped at the current
    /// minute. Returns `0.0` when the clamped range is empty or either
    /// endpoint finds no usable data.
    ///
    /// # Errors
    ///
    /// [`Error::UnscaledDelta`] for [`SeriesUnit::Raw`], plus the
    /// [`get_value`](Self::get_value) error policy.
    pub fn sum(
        &mut self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: SeriesUnit,
    ) -> Result<f64> {
        let Some(header) = self.load_header()? else {
            return Ok(0.0);
        };
        let upper = header.end.min(truncate_to_minute(Utc::now()));
        if upper <= header.start {
            return Ok(0.0);
        }
        let lo = truncate_to_minute(begin).clamp(header.start, upper);
        let hi = truncate_to_minute(end).clamp(header.start, upper);
        if lo >= hi {
            return Ok(0.0);
        }

        let Some(first) = self.get_closest_value(lo, ScanDirection::Forward)? else {
            return Ok(0.0);
        };
        let Some(last) = self.get_closest_value(hi, ScanDirection::Backward)? else {
            return Ok(0.0);
        };
        delta(&first, &last, unit, self.options.precision)
    }

    /// Fills each bucket's value with the consumption delta between the
    /// closest records around its (clamped) bounds.
    ///
    /// Buckets are expected in ascending time order; when one bucket starts
    /// where the previous ended, the previous end record is reused instead
    /// of being looked up again. Buckets without matching data keep
    /// `value: None`. Returns `false` only when there is no file to read.
    ///
    /// # Errors
    ///
    /// [`Error::UnscaledDelta`] for [`SeriesUnit::Raw`], plus the
    /// [`get_value`](Self::get_value) error policy.
    pub fn get_records(
        &mut self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: SeriesUnit,
        buckets: &mut [TimeBucket],
        negate: bool,
    ) -> Result<bool> {
        if self.load_header()?.is_none() {
            return Ok(false);
        }
        let q_lo = truncate_to_minute(begin);
        let q_hi = truncate_to_minute(end);
        let precision = self.options.precision;

        let mut carry: Option<SlotRecord> = None;
        let mut prev_hi: Option<DateTime<Utc>> = None;
        for bucket in buckets.iter_mut() {
            let lo = truncate_to_minute(bucket.begin).max(q_lo).min(q_hi);
            let hi = truncate_to_minute(bucket.end).max(q_lo).min(q_hi);
            if lo >= hi {
                bucket.value = None;
                carry = None;
                prev_hi = None;
                continue;
            }

            let first = if prev_hi == Some(lo) && carry.is_some() {
                carry
            } else {
                self.get_closest_value(lo, ScanDirection::Forward)?
            };
            let last = self.get_closest_value(hi, ScanDirection::Backward)?;

            bucket.value = match (&first, &last) {
                (Some(first), Some(last)) => {
                    let value = delta(first, last, unit, precision)?;
                    Some(if negate { -value } else { value })
                }
                _ => None,
            };
            carry = last;
            prev_hi = Some(hi);
        }
        Ok(true)
    }

    /// Downgrades a read failure to "no value", keeping only stream
    /// truncation fatal.
    fn soften_read_error<T>(&self, err: Error) -> Result<Option<T>> {
        match err {
            Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::Io(io)),
            err => {
                debug!(
                    path = %self.path.display(),
                    %err,
                    "read failed, treating as missing value"
                );
                Ok(None)
            }
        }
    }
}
