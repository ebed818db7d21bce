//! Growth behavior of the per-thread event buffer.
//!
//! The buffer must absorb common short-lived workloads without ever
//! reallocating, and double exactly once when it finally fills; a tracer
//! that reallocates on the hot path distorts the timing it measures.

use contienda::clock::Baseline;
use contienda::events::{EventBuffer, EventKind, INITIAL_CAPACITY};

fn fill(buffer: &mut EventBuffer, clock: &Baseline, count: usize) {
    for i in 0..count {
        buffer.record(clock, EventKind::WaitMutex, i, 0x40_0000 + i);
    }
}

#[test]
fn test_default_capacity_is_large() {
    assert_eq!(INITIAL_CAPACITY, 100_000);
}

#[test]
fn test_ten_thousand_events_never_reallocate() {
    let clock = Baseline::now();
    let mut buffer = EventBuffer::try_with_capacity(INITIAL_CAPACITY).unwrap();

    fill(&mut buffer, &clock, 10_050);

    assert_eq!(buffer.len(), 10_050);
    assert_eq!(buffer.capacity(), INITIAL_CAPACITY);
    assert_eq!(buffer.dropped(), 0);
}

#[test]
fn test_overflow_triggers_exactly_one_doubling() {
    let clock = Baseline::now();
    let mut buffer = EventBuffer::try_with_capacity(INITIAL_CAPACITY).unwrap();

    fill(&mut buffer, &clock, 150_000);

    assert_eq!(buffer.len(), 150_000);
    assert_eq!(buffer.capacity(), 2 * INITIAL_CAPACITY);
    assert_eq!(buffer.dropped(), 0);
}

#[test]
fn test_repeated_doubling_from_small_capacity() {
    let clock = Baseline::now();
    let mut buffer = EventBuffer::try_with_capacity(8).unwrap();

    fill(&mut buffer, &clock, 100);

    assert_eq!(buffer.len(), 100);
    // 8 -> 16 -> 32 -> 64 -> 128
    assert_eq!(buffer.capacity(), 128);
}

#[test]
fn test_events_survive_growth_in_order() {
    let clock = Baseline::now();
    let mut buffer = EventBuffer::try_with_capacity(4).unwrap();

    fill(&mut buffer, &clock, 64);

    for (i, event) in buffer.events().iter().enumerate() {
        assert_eq!(event.subject, i);
    }
}

#[test]
fn test_timestamps_nondecreasing_across_growth() {
    let clock = Baseline::now();
    let mut buffer = EventBuffer::try_with_capacity(2).unwrap();

    fill(&mut buffer, &clock, 1000);

    for pair in buffer.events().windows(2) {
        assert!(pair[1].when >= pair[0].when);
    }
}
