//! Query scenarios: sums, bucket series, and range clamping.

use chrono::Duration;

use pulsedb_core::{SeriesUnit, StoreOptions, TimeBucket};

use crate::helpers::{feed_sequence, minutes_ago, setup_store};

#[test]
fn test_volumetric_sum_over_the_whole_series() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(120);

    feed_sequence(&mut store, base, &[100, 120, 150], 50.0, 1.0)
        .expect("Sequence should land");

    let sum = store
        .sum(base, base + Duration::minutes(2), SeriesUnit::Volumetric)
        .expect("Failed to sum");
    // (150 - 100) pulses at 50 per unit = 1 unit = 1000 sub-units.
    assert!((sum - 1000.0).abs() < 1e-9, "got {sum}");
}

#[test]
fn test_sum_clamps_to_stored_range() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(120);

    feed_sequence(&mut store, base, &[100, 120, 150], 50.0, 1.0)
        .expect("Sequence should land");

    let clamped = store
        .sum(
            base - Duration::days(10),
            base + Duration::days(10),
            SeriesUnit::Volumetric,
        )
        .expect("Failed to sum");
    assert!((clamped - 1000.0).abs() < 1e-9, "got {clamped}");
}

#[test]
fn test_sum_without_usable_data_is_zero() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(240);

    feed_sequence(&mut store, base, &[10, 20], 1.0, 1.0).expect("Sequence should land");

    // Entirely before the stored range: the clamped window collapses.
    let before = store
        .sum(
            base - Duration::days(3),
            base - Duration::days(2),
            SeriesUnit::Volumetric,
        )
        .expect("Failed to sum");
    assert!(before.abs() < f64::EPSILON);

    // Inside the file but past the last reading: no value ahead to anchor on.
    let after = store
        .sum(
            base + Duration::minutes(100),
            base + Duration::minutes(200),
            SeriesUnit::Volumetric,
        )
        .expect("Failed to sum");
    assert!(after.abs() < f64::EPSILON);
}

#[test]
fn test_per_time_sum_scales_sub_hour_gaps_to_rates() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(120);

    let first = store
        .set_value(base, 0, 1.0, 1.0, None)
        .expect("Failed to write")
        .expect("Write should land");
    store
        .set_value(base + Duration::minutes(10), 50, 1.0, 1.0, Some(&first))
        .expect("Failed to write")
        .expect("Write should land");

    let sum = store
        .sum(base, base + Duration::minutes(10), SeriesUnit::PerTime)
        .expect("Failed to sum");
    // 50 units over 10 minutes, expressed as an hourly rate in sub-units.
    assert!((sum - 300_000.0).abs() < 1e-6, "got {sum}");
}

#[test]
fn test_hourly_buckets_and_negation() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(300);

    let mut previous = None;
    for (hours, raw) in [(0, 0u64), (1, 60), (2, 180)] {
        previous = store
            .set_value(
                base + Duration::hours(hours),
                raw,
                1.0,
                1.0,
                previous.as_ref(),
            )
            .expect("Failed to write");
    }

    let mut buckets = vec![
        TimeBucket::new(base, base + Duration::hours(1)),
        TimeBucket::new(base + Duration::hours(1), base + Duration::hours(2)),
    ];
    let found = store
        .get_records(
            base,
            base + Duration::hours(2),
            SeriesUnit::PerTime,
            &mut buckets,
            false,
        )
        .expect("Failed to query");
    assert!(found);

    let first = buckets[0].value.expect("bucket 0");
    assert!((first - 60_000.0).abs() < 1e-6, "got {first}");
    let second = buckets[1].value.expect("bucket 1");
    assert!((second - 120_000.0).abs() < 1e-6, "got {second}");

    // The negate flag flips the sign for feed-in style counters.
    let mut negated = vec![
        TimeBucket::new(base, base + Duration::hours(1)),
        TimeBucket::new(base + Duration::hours(1), base + Duration::hours(2)),
    ];
    store
        .get_records(
            base,
            base + Duration::hours(2),
            SeriesUnit::PerTime,
            &mut negated,
            true,
        )
        .expect("Failed to query");
    assert!((negated[0].value.expect("bucket 0") + 60_000.0).abs() < 1e-6);
    assert!((negated[1].value.expect("bucket 1") + 120_000.0).abs() < 1e-6);
}

#[test]
fn test_buckets_without_matching_data_stay_empty() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(300);

    feed_sequence(&mut store, base, &[5, 10], 1.0, 1.0).expect("Sequence should land");

    // One bucket over the data, one entirely past it, one degenerate
    // (clamped to nothing by the query range).
    let mut buckets = vec![
        TimeBucket::new(base, base + Duration::minutes(1)),
        TimeBucket::new(base + Duration::minutes(100), base + Duration::minutes(160)),
        TimeBucket::new(base + Duration::minutes(200), base + Duration::minutes(260)),
    ];
    let found = store
        .get_records(
            base,
            base + Duration::minutes(160),
            SeriesUnit::Volumetric,
            &mut buckets,
            false,
        )
        .expect("Failed to query");
    assert!(found);

    assert!(buckets[0].value.is_some());
    assert!(
        buckets[1].value.is_none(),
        "no reading inside or after the bucket"
    );
    assert!(
        buckets[2].value.is_none(),
        "bucket clamped away by the query range"
    );
}
