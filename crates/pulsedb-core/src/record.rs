//! On-disk slot record and fixed-point scaling.
//!
//! One slot describes one calendar minute and occupies exactly 26 bytes:
//!
//! ```text
//! ┌──────────────┬──────────────────┬────────────────┬──────────────┐
//! │ raw: u64 LE  │ energy: i64 LE   │ cost: i64 LE   │ quality: u16 │
//! │ pulse count  │ scaled by        │ scaled by      │ LE, 0 = real │
//! │ (8 bytes)    │ Precision (8 B)  │ Precision (8 B)│ (2 bytes)    │
//! └──────────────┴──────────────────┴────────────────┴──────────────┘
//! ```
//!
//! The slot's timestamp is not stored; its position in the file encodes it,
//! and readers stamp it back on when decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of bytes one slot occupies on disk.
pub const RECORD_LEN: usize = 26;

/// Reserved raw value marking a slot that has never carried a measurement.
pub const SENTINEL_RAW: u64 = u64::MAX;

/// Fixed-point scaling applied when decimal energy/cost values are stored as
/// `i64`.
///
/// The factor is chosen when the file is created and must be supplied
/// unchanged on every later open; the header does not record it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    /// One scaled step per whole unit.
    Whole,
    /// One scaled step per 0.001 unit.
    #[default]
    Milli,
    /// One scaled step per 0.0001 unit, for meters whose pulses-per-unit is
    /// high enough that milli resolution cannot represent a single pulse.
    TenthMilli,
}

impl Precision {
    /// Scaled steps per whole unit.
    #[must_use]
    pub const fn factor(self) -> i64 {
        match self {
            Precision::Whole => 1,
            Precision::Milli => 1_000,
            Precision::TenthMilli => 10_000,
        }
    }

    /// Converts a pulse count into the scaled energy domain:
    /// `pulses * factor / pulses_per_unit`.
    ///
    /// Running totals are carried in this domain so that integral scaled
    /// values stay exact across accumulate/truncate cycles.
    #[allow(clippy::cast_precision_loss)] // Reason: pulse counts stay far below 2^52
    #[must_use]
    pub(crate) fn scale_pulses(self, pulses: u64, pulses_per_unit: f64) -> f64 {
        pulses as f64 * self.factor() as f64 / pulses_per_unit
    }

    /// Truncates a scaled-domain value to its on-disk integer, toward zero.
    #[allow(clippy::cast_possible_truncation)] // Reason: truncation toward zero is the on-disk contract
    #[must_use]
    pub(crate) fn truncate_scaled(self, scaled: f64) -> i64 {
        scaled as i64
    }

    /// Converts an on-disk scaled integer back to a decimal business value.
    #[allow(clippy::cast_precision_loss)] // Reason: display conversion, sub-ulp error is acceptable
    #[must_use]
    pub fn to_decimal(self, scaled: i64) -> f64 {
        scaled as f64 / self.factor() as f64
    }
}

/// One minute's measurement state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotRecord {
    /// Cumulative pulse count reported by the device; [`SENTINEL_RAW`] when
    /// the slot was never written or holds an interpolated value.
    pub raw: u64,
    /// Cumulative energy, scaled by the file's [`Precision`].
    pub energy: i64,
    /// Cumulative cost, scaled by the file's [`Precision`].
    pub cost: i64,
    /// Interpolation confidence: 0 for a direct measurement, otherwise
    /// `round(log10(gap minutes) * 10000)`.
    pub quality: u16,
    /// Minute this slot represents, stamped at read time.
    pub timestamp: DateTime<Utc>,
}

impl SlotRecord {
    /// The state of a slot that has never been written.
    #[must_use]
    pub fn untouched(timestamp: DateTime<Utc>) -> Self {
        Self {
            raw: SENTINEL_RAW,
            energy: 0,
            cost: 0,
            quality: 0,
            timestamp,
        }
    }

    /// Whether the slot carries a real measurement.
    ///
    /// A sentinel raw value with a non-zero quality still counts as valid
    /// while overwriting is disallowed: it marks a legitimate wraparound at
    /// the sentinel, as opposed to "never written".
    #[must_use]
    pub fn is_valid(&self, overwrite_allowed: bool) -> bool {
        self.raw < SENTINEL_RAW
            || (self.raw == SENTINEL_RAW && self.quality > 0 && !overwrite_allowed)
    }

    /// Whether the slot is in its zero-filled initial state.
    #[must_use]
    pub fn is_untouched(&self) -> bool {
        self.raw == SENTINEL_RAW && self.energy == 0 && self.cost == 0 && self.quality == 0
    }

    /// Serializes the slot into its fixed 26-byte layout.
    #[must_use]
    pub(crate) fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..8].copy_from_slice(&self.raw.to_le_bytes());
        buf[8..16].copy_from_slice(&self.energy.to_le_bytes());
        buf[16..24].copy_from_slice(&self.cost.to_le_bytes());
        buf[24..26].copy_from_slice(&self.quality.to_le_bytes());
        buf
    }

    /// Deserializes a slot from its fixed layout, stamping `timestamp` on.
    #[must_use]
    pub(crate) fn from_bytes(bytes: &[u8; RECORD_LEN], timestamp: DateTime<Utc>) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[0..8]);
        let mut energy = [0u8; 8];
        energy.copy_from_slice(&bytes[8..16]);
        let mut cost = [0u8; 8];
        cost.copy_from_slice(&bytes[16..24]);
        let mut quality = [0u8; 2];
        quality.copy_from_slice(&bytes[24..26]);
        Self {
            raw: u64::from_le_bytes(raw),
            energy: i64::from_le_bytes(energy),
            cost: i64::from_le_bytes(cost),
            quality: u16::from_le_bytes(quality),
            timestamp,
        }
    }
}
