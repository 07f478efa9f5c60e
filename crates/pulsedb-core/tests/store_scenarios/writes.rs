//! Write-path scenarios: scaling, gap filling, and the overwrite guard.

use chrono::Duration;

use pulsedb_core::{StoreOptions, SENTINEL_RAW};

use crate::helpers::{feed_sequence, minutes_ago, setup_store};

#[test]
fn test_first_reading_scales_energy_and_cost() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let at = minutes_ago(30);

    let written = store
        .set_value(at, 25, 50.0, 15.0, None)
        .expect("Failed to write")
        .expect("Write should land");
    assert_eq!(written.raw, 25);
    assert_eq!(written.energy, 500, "25 pulses / 50 per unit = 0.5 units");
    assert_eq!(written.cost, 7500, "0.5 units * 15 per unit = 7.5");
    assert_eq!(written.quality, 0);

    let read = store.get_value(at).expect("Failed to read").expect("Slot");
    assert_eq!(read.raw, 25);
    assert_eq!(read.energy, 500);
    assert_eq!(read.cost, 7500);

    // The following minute was never written and must still be untouched.
    let next = store
        .get_value(at + Duration::minutes(1))
        .expect("Failed to read")
        .expect("Slot exists inside the range");
    assert_eq!(next.raw, SENTINEL_RAW);
    assert_eq!(next.quality, 0);
    assert!(next.is_untouched());
}

#[test]
fn test_five_minute_gap_interpolates_with_quality() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(60);

    let first = store
        .set_value(base, 100, 1.0, 2.0, None)
        .expect("Failed to write")
        .expect("Write should land");
    store
        .set_value(base + Duration::minutes(5), 150, 1.0, 2.0, Some(&first))
        .expect("Failed to write")
        .expect("Write should land");

    // Four interpolated slots carry the gap quality and sentinel raw.
    for i in 1..5 {
        let slot = store
            .get_value(base + Duration::minutes(i))
            .expect("Failed to read")
            .expect("Slot");
        assert_eq!(slot.raw, SENTINEL_RAW, "minute {i} is interpolated");
        assert_eq!(slot.quality, 6990, "round(log10(5) * 10000)");
        assert_eq!(slot.energy, 100_000 + i * 10_000);
        assert_eq!(slot.cost, 200_000 + i * 20_000);
    }

    let last = store
        .get_value(base + Duration::minutes(5))
        .expect("Failed to read")
        .expect("Slot");
    assert_eq!(last.raw, 150);
    assert_eq!(last.quality, 0, "the measured slot is quality 0");
    assert_eq!(last.energy, 150_000);
    assert_eq!(last.cost, 300_000);
}

#[test]
fn test_gap_remainder_lands_on_earliest_slots() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(60);

    let first = store
        .set_value(base, 10, 1.0, 1.0, None)
        .expect("Failed to write")
        .expect("Write should land");
    // Delta 7 over 5 minutes: shares 2,2,1,1,1.
    store
        .set_value(base + Duration::minutes(5), 17, 1.0, 1.0, Some(&first))
        .expect("Failed to write")
        .expect("Write should land");

    let mut previous_energy = first.energy;
    let expected_increments = [2000, 2000, 1000, 1000, 1000];
    for (i, expected) in expected_increments.iter().enumerate() {
        let at = base + Duration::minutes(i64::try_from(i).expect("Small index") + 1);
        let slot = store
            .get_value(at)
            .expect("Failed to read")
            .expect("Slot");
        assert_eq!(
            slot.energy - previous_energy,
            *expected,
            "increment at minute {}",
            i + 1
        );
        previous_energy = slot.energy;
    }
}

#[test]
fn test_earlier_or_equal_timestamp_leaves_data_unchanged() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(60);

    let last = feed_sequence(&mut store, base, &[10, 20, 30], 1.0, 1.0)
        .expect("Sequence should land");

    // Same minute again.
    assert!(store
        .set_value(base + Duration::minutes(2), 99, 1.0, 1.0, Some(&last))
        .expect("Failed to call")
        .is_none());
    // Strictly earlier.
    assert!(store
        .set_value(base + Duration::minutes(1), 99, 1.0, 1.0, Some(&last))
        .expect("Failed to call")
        .is_none());

    for (i, raw) in [10u64, 20, 30].into_iter().enumerate() {
        let at = base + Duration::minutes(i64::try_from(i).expect("Small index"));
        let slot = store
            .get_value(at)
            .expect("Failed to read")
            .expect("Slot");
        assert_eq!(slot.raw, raw, "slot {i} must be unchanged");
    }
}

#[test]
fn test_totals_accumulate_across_sequential_readings() {
    let (_dir, mut store) = setup_store(StoreOptions::default());
    let base = minutes_ago(60);

    feed_sequence(&mut store, base, &[1000, 1010, 1025, 1025, 1100], 10.0, 0.5)
        .expect("Sequence should land");

    // First reading seeds the totals from the full raw count.
    let mut previous_energy = None;
    for i in 0..5 {
        let slot = store
            .get_value(base + Duration::minutes(i))
            .expect("Failed to read")
            .expect("Slot");
        if let Some(previous) = previous_energy {
            assert!(slot.energy >= previous, "energy never moves backwards");
            assert_eq!(slot.cost * 2, slot.energy, "cost tracks energy * 0.5");
        }
        previous_energy = Some(slot.energy);
    }

    let final_slot = store
        .get_value(base + Duration::minutes(4))
        .expect("Failed to read")
        .expect("Slot");
    // 1000/10 units seeded, plus (1100 - 1000)/10 units consumed.
    assert_eq!(final_slot.energy, 100_000 + 10_000);
}
