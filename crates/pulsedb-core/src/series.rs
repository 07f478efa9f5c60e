//! Series units, reporting buckets, and delta arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::{Precision, SlotRecord};
use crate::time;

/// Unit family of a queried series, deciding how consumption deltas are
/// scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeriesUnit {
    /// Accumulating per-time unit (energy). Deltas over gaps shorter than an
    /// hour are scaled to an instantaneous-like rate.
    PerTime,
    /// Volumetric unit (gas, water). Deltas are plain differences.
    Volumetric,
    /// Raw pulse counts. They carry no unit, so differencing them is an
    /// error.
    Raw,
}

/// One caller-supplied reporting bucket.
///
/// `value` stays `None` until a query fills it in; buckets with no matching
/// data keep it `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    /// Inclusive start of the bucket.
    pub begin: DateTime<Utc>,
    /// Exclusive end of the bucket.
    pub end: DateTime<Utc>,
    /// Consumption within the bucket, in the queried unit.
    pub value: Option<f64>,
}

impl TimeBucket {
    /// Creates an empty bucket spanning `[begin, end)`.
    #[must_use]
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            begin,
            end,
            value: None,
        }
    }
}

/// Consumption between two records, expressed in the querying unit.
///
/// Works on the scaled-integer energy fields and multiplies before dividing,
/// so integral results come out exact. Per-time deltas over gaps under an
/// hour are scaled by `60 / minutes` to express an instantaneous-like rate,
/// then by 1000 into the reporting sub-unit; volumetric deltas are scaled by
/// 1000 only. A non-positive minute gap yields 0.
///
/// # Errors
///
/// [`Error::UnscaledDelta`] when `unit` is [`SeriesUnit::Raw`].
#[allow(clippy::cast_precision_loss)] // Reason: scaled totals stay far below 2^52
pub(crate) fn delta(
    first: &SlotRecord,
    last: &SlotRecord,
    unit: SeriesUnit,
    precision: Precision,
) -> Result<f64> {
    if unit == SeriesUnit::Raw {
        return Err(Error::UnscaledDelta);
    }
    let minutes = time::minutes_between(first.timestamp, last.timestamp);
    if minutes <= 0 {
        return Ok(0.0);
    }
    let diff = (last.energy - first.energy) as f64;
    let scaled = match unit {
        SeriesUnit::PerTime if minutes < 60 => diff * 1000.0 * 60.0 / minutes as f64,
        _ => diff * 1000.0,
    };
    Ok(scaled / precision.factor() as f64)
}
