//! Shared test utilities for the store scenario tests.

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use pulsedb_core::time::truncate_to_minute;
use pulsedb_core::{MinuteStore, SlotRecord, StoreOptions};

/// Creates a store over a fresh temp directory.
///
/// Returns `(TempDir, MinuteStore)` — keep the `TempDir` alive for the test
/// duration.
pub fn setup_store(options: StoreOptions) -> (TempDir, MinuteStore) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = MinuteStore::open(temp_dir.path().join("meter.mts"), options)
        .expect("Failed to open store");
    (temp_dir, store)
}

/// A minute-aligned timestamp `n` minutes in the past, safely inside the
/// allowed write window.
pub fn minutes_ago(n: i64) -> DateTime<Utc> {
    truncate_to_minute(Utc::now()) - Duration::minutes(n)
}

/// Feeds `raws` one minute apart starting at `base`, carrying the running
/// total between calls the way a live ingest loop would. Returns the last
/// record written.
#[allow(clippy::cast_possible_wrap)] // Reason: test sequences are a handful of readings
pub fn feed_sequence(
    store: &mut MinuteStore,
    base: DateTime<Utc>,
    raws: &[u64],
    pulses_per_unit: f64,
    currency_per_unit: f64,
) -> Option<SlotRecord> {
    let mut previous = None;
    for (i, raw) in raws.iter().enumerate() {
        let at = base + Duration::minutes(i as i64);
        previous = store
            .set_value(at, *raw, pulses_per_unit, currency_per_unit, previous.as_ref())
            .expect("Failed to write reading");
        assert!(previous.is_some(), "reading at {at} should be accepted");
    }
    previous
}
