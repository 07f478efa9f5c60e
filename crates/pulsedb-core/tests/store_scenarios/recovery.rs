//! Growth, damage recovery, and lock contention scenarios.

use chrono::{Duration, Utc};

use pulsedb_core::time::truncate_to_minute;
use pulsedb_core::{Error, MinuteStore, StoreOptions, SENTINEL_RAW};

use crate::helpers::{feed_sequence, minutes_ago, setup_store};

fn one_day_growth() -> StoreOptions {
    StoreOptions {
        growth_days: 1,
        ..StoreOptions::default()
    }
}

#[test]
fn test_end_of_file_grows_monotonically() {
    let (_dir, mut store) = setup_store(one_day_growth());
    let base = truncate_to_minute(Utc::now()) - Duration::days(2);

    let first = store
        .set_value(base, 10, 1.0, 1.0, None)
        .expect("Failed to write")
        .expect("Write should land");
    let created_end = store
        .load_header()
        .expect("Failed to load header")
        .expect("Header")
        .end;
    assert_eq!(created_end, base + Duration::days(1));

    // Writing exactly at the end of the range must extend it.
    let at_end = base + Duration::days(1);
    store
        .set_value(at_end, 20, 1.0, 1.0, Some(&first))
        .expect("Failed to write")
        .expect("Write should land");
    let grown_end = store
        .load_header()
        .expect("Failed to load header")
        .expect("Header")
        .end;
    assert_eq!(grown_end, at_end + Duration::days(1));
    assert!(grown_end > created_end, "end only ever moves forward");

    // The day-long gap was interpolated: spot-check one middle slot.
    let middle = store
        .get_value(base + Duration::minutes(720))
        .expect("Failed to read")
        .expect("Slot");
    assert_eq!(middle.raw, SENTINEL_RAW);
    assert_eq!(middle.quality, 31_584, "round(log10(1440) * 10000)");

    let last = store
        .get_value(at_end)
        .expect("Failed to read")
        .expect("Slot");
    assert_eq!(last.raw, 20);
}

#[test]
fn test_grown_end_survives_reopen() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("meter.mts");
    let base = truncate_to_minute(Utc::now()) - Duration::days(2);

    {
        let mut store = MinuteStore::open(&path, one_day_growth()).expect("Failed to open");
        let first = store
            .set_value(base, 10, 1.0, 1.0, None)
            .expect("Failed to write");
        store
            .set_value(
                base + Duration::days(1),
                20,
                1.0,
                1.0,
                first.as_ref(),
            )
            .expect("Failed to write")
            .expect("Write should land");
    }

    let mut reopened = MinuteStore::open(&path, one_day_growth()).expect("Failed to open");
    let header = reopened
        .load_header()
        .expect("Failed to load header")
        .expect("Header");
    assert_eq!(header.start, base);
    assert_eq!(header.end, base + Duration::days(2));

    let read = reopened
        .get_value(base + Duration::days(1))
        .expect("Failed to read")
        .expect("Slot");
    assert_eq!(read.raw, 20);
}

#[test]
fn test_truncated_file_is_deleted_and_recreated() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("meter.mts");

    {
        let mut store = MinuteStore::open(&path, StoreOptions::default()).expect("Failed to open");
        store
            .set_value(minutes_ago(30), 5, 1.0, 1.0, None)
            .expect("Failed to write")
            .expect("Write should land");
    }

    // Chop the file below the header size, as a crashed writer might.
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("Failed to reopen file")
        .set_len(10)
        .expect("Failed to truncate");

    let mut store = MinuteStore::open(&path, StoreOptions::default()).expect("Failed to open");
    assert!(
        store
            .get_value(minutes_ago(30))
            .expect("Read should degrade, not fail")
            .is_none(),
        "truncated file must read as empty"
    );
    assert!(!path.exists(), "unreadable file must be deleted");

    let at = minutes_ago(20);
    store
        .set_value(at, 7, 1.0, 1.0, None)
        .expect("Failed to write")
        .expect("Write should land");
    let read = store.get_value(at).expect("Failed to read").expect("Slot");
    assert_eq!(read.raw, 7);
    assert_eq!(read.energy, 7000);
}

#[test]
fn test_truncation_under_a_live_header_is_fatal() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("meter.mts");

    let at = minutes_ago(30);
    let mut store = MinuteStore::open(&path, StoreOptions::default()).expect("Failed to open");
    store
        .set_value(at, 5, 1.0, 1.0, None)
        .expect("Failed to write")
        .expect("Write should land");
    store.close().expect("Failed to close");

    // The store already trusts its header; shrinking the file behind its
    // back must surface as an error, not as a silent missing value. Keep
    // the header intact and probe a slot past the new physical end.
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("Failed to reopen file")
        .set_len(100)
        .expect("Failed to truncate");

    let err = store
        .get_value(at + Duration::minutes(10))
        .expect_err("Truncation must be fatal");
    assert!(matches!(
        err,
        Error::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof
    ));
}

#[test]
fn test_second_writer_times_out_then_recovers() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("meter.mts");
    let base = minutes_ago(30);

    let mut holder = MinuteStore::open(&path, StoreOptions::default()).expect("Failed to open");
    holder
        .set_value(base, 10, 1.0, 1.0, None)
        .expect("Failed to write")
        .expect("Write should land");

    let contender_options = StoreOptions {
        lock_retry_interval_ms: 50,
        lock_timeout_ms: 200,
        ..StoreOptions::default()
    };
    let mut contender =
        MinuteStore::open(&path, contender_options).expect("Failed to open");

    let err = contender
        .set_value(base + Duration::minutes(1), 20, 1.0, 1.0, None)
        .expect_err("Lock is held by the first store");
    assert!(matches!(err, Error::LockTimeout { .. }), "got {err}");

    // Releasing the first writer lets the second one through.
    holder.close().expect("Failed to close");
    contender
        .set_value(base + Duration::minutes(2), 30, 1.0, 1.0, None)
        .expect("Failed to write")
        .expect("Write should land");

    let read = contender
        .get_value(base + Duration::minutes(2))
        .expect("Failed to read")
        .expect("Slot");
    assert_eq!(read.raw, 30);
}

#[test]
fn test_reinitialized_tail_survives_reopen() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("meter.mts");
    let base = minutes_ago(50);

    {
        let mut store = MinuteStore::open(&path, StoreOptions::default()).expect("Failed to open");
        feed_sequence(&mut store, base, &[10, 20, 30, 40], 1.0, 1.0)
            .expect("Sequence should land");
        store
            .reinitialize_slots(base + Duration::minutes(2))
            .expect("Failed to re-initialize");
    }

    let mut reopened = MinuteStore::open(&path, StoreOptions::default()).expect("Failed to open");
    let kept = reopened
        .get_value(base + Duration::minutes(1))
        .expect("Failed to read")
        .expect("Slot");
    assert_eq!(kept.raw, 20);

    for i in 2..4 {
        let erased = reopened
            .get_value(base + Duration::minutes(i))
            .expect("Failed to read")
            .expect("Slot");
        assert!(erased.is_untouched(), "slot {i} should be erased");
    }
}
