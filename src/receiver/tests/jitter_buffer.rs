use std::time::{Duration, Instant};

use crate::receiver::{DropReason, InsertOutcome, JitterBuffer, JitterBufferConfig};

fn small_config() -> JitterBufferConfig {
    JitterBufferConfig {
        target_delay_ms: 10,
        min_delay_ms: 5,
        max_delay_ms: 50,
        max_packets: 16,
    }
}

fn payload(tag: u8) -> Vec<u8> {
    vec![tag; 288]
}

#[test]
fn test_insert_orders_by_timestamp() {
    let mut buffer = JitterBuffer::new(small_config());
    let now = Instant::now();

    // T, T+96, T+48, T+144, T+192 arrive out of order.
    for (seq, ts) in [(0u16, 0u32), (2, 96), (1, 48), (3, 144), (4, 192)] {
        assert_eq!(
            buffer.insert(payload(seq as u8), seq, ts, now),
            InsertOutcome::Accepted
        );
    }
    assert_eq!(buffer.len(), 5);

    // Drain after the target delay: strict timestamp order.
    let later = now + Duration::from_millis(20);
    let mut timestamps = Vec::new();
    while let Some(entry) = buffer.pop(later) {
        timestamps.push(entry.timestamp);
    }
    assert_eq!(timestamps, vec![0, 48, 96, 144, 192]);
}

#[test]
fn test_duplicate_timestamp_rejected() {
    let mut buffer = JitterBuffer::new(small_config());
    let now = Instant::now();

    assert_eq!(buffer.insert(payload(1), 1, 480, now), InsertOutcome::Accepted);
    match buffer.insert(payload(2), 1, 480, now) {
        InsertOutcome::Duplicate(returned) => assert_eq!(returned, payload(2)),
        other => panic!("expected Duplicate, got {other:?}"),
    }

    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.stats().duplicates, 1);
}

#[test]
fn test_full_buffer_evicts_oldest() {
    let mut buffer = JitterBuffer::new(JitterBufferConfig {
        max_packets: 4,
        ..small_config()
    });
    let now = Instant::now();

    for i in 0u32..5 {
        buffer.insert(payload(i as u8), i as u16, i * 48, now);
    }

    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.overruns(), 1);

    // The first-inserted (oldest timestamp) is gone.
    let later = now + Duration::from_millis(20);
    let first = buffer.pop(later).unwrap();
    assert_eq!(first.timestamp, 48);
}

#[test]
fn test_pop_waits_for_target_delay() {
    let mut buffer = JitterBuffer::new(small_config());
    let now = Instant::now();

    buffer.insert(payload(0), 0, 0, now);
    // Too fresh, and only one packet queued.
    assert!(buffer.pop(now + Duration::from_millis(2)).is_none());
    // Due once the target delay has elapsed.
    assert!(buffer.pop(now + Duration::from_millis(11)).is_some());
}

#[test]
fn test_pressure_release_at_three_packets() {
    let mut buffer = JitterBuffer::new(small_config());
    let now = Instant::now();

    buffer.insert(payload(0), 0, 0, now);
    buffer.insert(payload(1), 1, 48, now);
    assert!(buffer.pop(now).is_none());

    // A third queued packet releases the head before the delay elapses.
    buffer.insert(payload(2), 2, 96, now);
    let head = buffer.pop(now).unwrap();
    assert_eq!(head.timestamp, 0);
}

#[test]
fn test_timestamp_wrap_orders_correctly() {
    let mut buffer = JitterBuffer::new(small_config());
    let now = Instant::now();

    let near_max = u32::MAX - 47;
    // Post-wrap packet arrives first.
    buffer.insert(payload(1), 1, 0, now);
    buffer.insert(payload(0), 0, near_max, now);
    buffer.insert(payload(2), 2, 48, now);

    let later = now + Duration::from_millis(20);
    let mut order = Vec::new();
    while let Some(entry) = buffer.pop(later) {
        order.push(entry.timestamp);
    }
    assert_eq!(order, vec![near_max, 0, 48]);
}

#[test]
fn test_late_packet_dropped_after_playout_passed_it() {
    let mut buffer = JitterBuffer::new(small_config());
    let now = Instant::now();

    buffer.insert(payload(1), 1, 96, now);
    let later = now + Duration::from_millis(20);
    assert!(buffer.pop(later).is_some());

    // Timestamp 48 is already behind the playout position.
    match buffer.insert(payload(9), 9, 48, later) {
        InsertOutcome::Dropped(DropReason::TooLate, returned) => {
            assert_eq!(returned, payload(9));
        }
        other => panic!("expected TooLate, got {other:?}"),
    }
    assert_eq!(buffer.stats().dropped, 1);
}

#[test]
fn test_level_and_latency() {
    let mut buffer = JitterBuffer::new(JitterBufferConfig {
        max_packets: 10,
        ..small_config()
    });
    let now = Instant::now();

    assert!(buffer.is_empty());
    assert!((buffer.level() - 0.0).abs() < f64::EPSILON);
    assert!((buffer.latency_ms(now) - 0.0).abs() < f64::EPSILON);

    buffer.insert(payload(0), 0, 0, now);
    buffer.insert(payload(1), 1, 48, now);
    assert!((buffer.level() - 0.2).abs() < 1e-9);

    let later = now + Duration::from_millis(25);
    assert!((buffer.latency_ms(later) - 25.0).abs() < 5.0);
}

#[test]
fn test_reset_forgets_playout_position() {
    let mut buffer = JitterBuffer::new(small_config());
    let now = Instant::now();

    buffer.insert(payload(0), 0, 9600, now);
    assert!(buffer.pop(now + Duration::from_millis(20)).is_some());
    buffer.reset();

    // After reset an "older" timestamp is acceptable again.
    assert_eq!(
        buffer.insert(payload(1), 1, 480, now),
        InsertOutcome::Accepted
    );
}

#[test]
fn test_size_never_exceeds_max_packets() {
    let mut buffer = JitterBuffer::new(JitterBufferConfig {
        max_packets: 8,
        ..small_config()
    });
    let now = Instant::now();

    for i in 0u32..100 {
        buffer.insert(payload(i as u8), i as u16, i * 48, now);
        assert!(buffer.len() <= 8);
    }
    assert_eq!(buffer.overruns(), 92);
}
