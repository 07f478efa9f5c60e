//! Minute-granular time helpers shared by the layout and the store.
//!
//! Every timestamp handled by the engine is truncated to a whole minute:
//! slots are minute-indexed, so sub-minute components never reach the disk.

use chrono::{DateTime, Utc};

/// Unix seconds of 2010-01-01T00:00:00Z, the earliest timestamp the engine
/// accepts. Measurements predating the fleet rollout come from devices with
/// a misconfigured clock and are dropped.
pub(crate) const EPOCH_FLOOR_SECS: i64 = 1_262_304_000;

/// How many minutes ahead of "now" a measurement may run before it is
/// rejected, covering ordinary device clock skew.
pub(crate) const FUTURE_WINDOW_MINUTES: i64 = 5;

/// Floors a timestamp to the start of its minute, dropping seconds and
/// sub-second components.
#[must_use]
pub fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    let floored = secs - secs.rem_euclid(60);
    DateTime::from_timestamp(floored, 0).unwrap_or(t)
}

/// Whole minutes from `a` to `b`, rounded down (negative when `b` precedes
/// `a`). This is the slot-index arithmetic used by the offset calculator.
#[must_use]
pub fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (b.timestamp() - a.timestamp()).div_euclid(60)
}

/// Minutes from `a` to `b`, rounded to nearest. Used when a caller-supplied
/// running total stands in for the previous record and its timestamp may not
/// sit exactly on a minute boundary.
#[must_use]
pub(crate) fn rounded_minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (b.timestamp() - a.timestamp() + 30).div_euclid(60)
}

/// Earliest timestamp accepted by the write path.
#[must_use]
pub fn epoch_floor() -> DateTime<Utc> {
    DateTime::from_timestamp(EPOCH_FLOOR_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
