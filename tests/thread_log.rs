//! Tests for the thread causal logs.

mod common;

use bytes::Bytes;
use causalog::log::delta::ThreadLogDelta;
use causalog::ops::counters::CausalLogMetrics;
use causalog::{
    BufferPool, ConsumerId, Determinant, DeterminantEncoder, EpochId, LocalThreadCausalLog,
    ThreadCausalLog, UpstreamThreadCausalLog,
};
use common::rng_bytes;
use std::sync::Arc;

fn local_log() -> LocalThreadCausalLog {
    LocalThreadCausalLog::new(
        BufferPool::new(64, 256),
        DeterminantEncoder::new(),
        Arc::new(CausalLogMetrics::new()),
    )
}

fn upstream_log() -> UpstreamThreadCausalLog {
    UpstreamThreadCausalLog::new(BufferPool::new(64, 256), Arc::new(CausalLogMetrics::new()))
}

// ============================================================================
// Local (single-producer) log
// ============================================================================

#[test]
fn single_producer_single_consumer_one_epoch() {
    let log = local_log();
    let epoch = EpochId::new(42);
    for value in [7, 11, 13] {
        log.append_determinant(&Determinant::Rng(value), epoch).unwrap();
    }

    let consumer = ConsumerId::new(0);
    let delta = log.next_determinants_for_downstream(consumer, epoch);
    assert_eq!(delta.epoch, epoch);
    assert_eq!(delta.offset_from_epoch, 0);
    assert_eq!(delta.len(), 15);
    assert_eq!(&delta.bytes[..], &rng_bytes(&[7, 11, 13])[..]);

    // no further appends: the second call is empty
    let again = log.next_determinants_for_downstream(consumer, epoch);
    assert!(again.is_empty());
}

#[test]
fn deltas_are_strict_continuations() {
    let log = local_log();
    let epoch = EpochId::new(1);
    let consumer = ConsumerId::new(9);

    log.append_determinant(&Determinant::Rng(1), epoch).unwrap();
    log.append_determinant(&Determinant::Rng(2), epoch).unwrap();
    let first = log.next_determinants_for_downstream(consumer, epoch);
    assert_eq!(first.offset_from_epoch, 0);
    assert_eq!(first.len(), 10);

    log.append_determinant(&Determinant::Rng(3), epoch).unwrap();
    let second = log.next_determinants_for_downstream(consumer, epoch);
    assert_eq!(second.offset_from_epoch, 10);
    assert_eq!(&second.bytes[..], &rng_bytes(&[3])[..]);

    let mut all = first.bytes.to_vec();
    all.extend_from_slice(&second.bytes);
    assert_eq!(all, rng_bytes(&[1, 2, 3]));
}

#[test]
fn per_consumer_cursors_are_independent() {
    let log = local_log();
    let epoch = EpochId::new(3);
    log.append_determinant(&Determinant::Rng(5), epoch).unwrap();

    let first = log.next_determinants_for_downstream(ConsumerId::new(1), epoch);
    assert_eq!(first.len(), 5);
    // a second consumer still sees everything
    let second = log.next_determinants_for_downstream(ConsumerId::new(2), epoch);
    assert_eq!(second.len(), 5);
}

#[test]
fn epoch_rollover_and_reclamation() {
    let log = local_log();
    log.append_determinant(&Determinant::Rng(1), EpochId::new(1)).unwrap();
    log.append_determinant(&Determinant::Rng(2), EpochId::new(2)).unwrap();
    log.append_determinant(&Determinant::Rng(3), EpochId::new(3)).unwrap();
    assert_eq!(log.log_length(), 15);

    log.notify_checkpoint_complete(EpochId::new(2));

    // only the epoch-2 and epoch-3 slices remain
    assert_eq!(log.log_length(), 10);
    let consumer = ConsumerId::new(0);
    let reclaimed = log.next_determinants_for_downstream(consumer, EpochId::new(1));
    assert!(reclaimed.is_empty());
    let kept = log.next_determinants_for_downstream(consumer, EpochId::new(3));
    assert_eq!(&kept.bytes[..], &rng_bytes(&[3])[..]);
}

#[test]
fn stale_checkpoint_notifications_are_noops() {
    let log = local_log();
    log.append_determinant(&Determinant::Rng(1), EpochId::new(5)).unwrap();
    log.append_determinant(&Determinant::Rng(2), EpochId::new(6)).unwrap();
    log.notify_checkpoint_complete(EpochId::new(6));
    let length = log.log_length();

    // repeated and stale notifications change nothing
    log.notify_checkpoint_complete(EpochId::new(6));
    log.notify_checkpoint_complete(EpochId::new(3));
    assert_eq!(log.log_length(), length);
}

#[test]
fn downstream_failure_rewinds_to_earliest_retained_epoch() {
    let log = local_log();
    let consumer = ConsumerId::new(4);
    for raw in 5..=7 {
        let epoch = EpochId::new(raw);
        log.append_determinant(&Determinant::Rng(raw as u32), epoch).unwrap();
        log.append_determinant(&Determinant::Timestamp(raw * 100), epoch).unwrap();
        // the consumer drains each epoch as it goes
        let delta = log.next_determinants_for_downstream(consumer, epoch);
        assert_eq!(delta.len(), 14);
    }
    log.notify_checkpoint_complete(EpochId::new(6));

    log.notify_downstream_failure(consumer);

    // the replacement replica replays from the earliest retained epoch
    let mut replayed = Vec::new();
    for raw in 6..=7 {
        let delta = log.next_determinants_for_downstream(consumer, EpochId::new(raw));
        assert_eq!(delta.offset_from_epoch, 0);
        replayed.extend_from_slice(&delta.bytes);
    }
    assert_eq!(replayed.len(), 28);
    assert_eq!(log.log_length(), 28);
}

#[test]
fn growth_preserves_bytes_and_cursors() {
    // 16-byte segments force growth every few appends
    let log = LocalThreadCausalLog::new(
        BufferPool::new(16, 64),
        DeterminantEncoder::new(),
        Arc::new(CausalLogMetrics::new()),
    );
    let epoch = EpochId::new(1);
    let consumer = ConsumerId::new(0);

    log.append_determinant(&Determinant::Rng(1), epoch).unwrap();
    let head = log.next_determinants_for_downstream(consumer, epoch);
    assert_eq!(head.len(), 5);

    let values: Vec<u32> = (2..50).collect();
    for &value in &values {
        log.append_determinant(&Determinant::Rng(value), epoch).unwrap();
    }

    // the cursor survives growth and the tail is one contiguous logical view
    let tail = log.next_determinants_for_downstream(consumer, epoch);
    assert_eq!(tail.offset_from_epoch, 5);
    assert_eq!(&tail.bytes[..], &rng_bytes(&values)[..]);
}

#[test]
fn pool_exhaustion_surfaces_to_the_producer() {
    let log = LocalThreadCausalLog::new(
        BufferPool::new(8, 1),
        DeterminantEncoder::new(),
        Arc::new(CausalLogMetrics::new()),
    );
    let epoch = EpochId::new(1);
    log.append_determinant(&Determinant::Rng(1), epoch).unwrap();
    let err = log
        .append_determinant(&Determinant::Rng(2), epoch)
        .unwrap_err();
    assert!(err.is_retriable());

    // the log still serves what it holds
    let delta = log.next_determinants_for_downstream(ConsumerId::new(0), epoch);
    assert_eq!(delta.len(), 5);
}

#[test]
fn closed_log_is_inert() {
    let log = local_log();
    let epoch = EpochId::new(2);
    log.append_determinant(&Determinant::Rng(9), epoch).unwrap();
    log.close();

    assert_eq!(log.log_length(), 0);
    assert!(log
        .next_determinants_for_downstream(ConsumerId::new(0), epoch)
        .is_empty());
    // appends after close are no-ops, not faults
    log.append_determinant(&Determinant::Rng(10), epoch).unwrap();
    assert_eq!(log.log_length(), 0);
    // close is idempotent
    log.close();
}

#[test]
fn lazy_cursor_creation_is_counted() {
    let metrics = Arc::new(CausalLogMetrics::new());
    let log = LocalThreadCausalLog::new(
        BufferPool::new(64, 64),
        DeterminantEncoder::new(),
        metrics.clone(),
    );
    let epoch = EpochId::new(1);
    log.append_determinant(&Determinant::Rng(1), epoch).unwrap();

    log.next_determinants_for_downstream(ConsumerId::new(7), epoch);
    log.next_determinants_for_downstream(ConsumerId::new(7), epoch);
    log.next_determinants_for_downstream(ConsumerId::new(8), epoch);
    assert_eq!(metrics.cursors_lazily_created(), 2);
}

// ============================================================================
// Upstream (multi-producer) log
// ============================================================================

fn delta(epoch: u64, offset: u64, bytes: &'static [u8]) -> ThreadLogDelta {
    ThreadLogDelta::new(EpochId::new(epoch), offset, Bytes::from_static(bytes))
}

fn drain(log: &UpstreamThreadCausalLog, epoch: u64) -> Vec<u8> {
    log.next_determinants_for_downstream(ConsumerId::new(99), EpochId::new(epoch))
        .bytes
        .to_vec()
}

#[test]
fn overlapping_deltas_are_idempotent_catch_up() {
    let log = upstream_log();
    log.process_upstream_delta(&delta(5, 0, &[0x00, 0x01, 0x02, 0x03])).unwrap();
    log.process_upstream_delta(&delta(5, 2, &[0x02, 0x03, 0x04, 0x05])).unwrap();
    assert_eq!(drain(&log, 5), vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
    assert_eq!(log.log_length(), 6);
}

#[test]
fn reversed_delivery_converges_to_the_same_state() {
    let log = upstream_log();
    log.process_upstream_delta(&delta(5, 2, &[0x02, 0x03, 0x04, 0x05])).unwrap();
    log.process_upstream_delta(&delta(5, 0, &[0x00, 0x01, 0x02, 0x03])).unwrap();
    assert_eq!(drain(&log, 5), vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
}

#[test]
fn bytes_past_a_hole_are_withheld() {
    let metrics = Arc::new(CausalLogMetrics::new());
    let log = UpstreamThreadCausalLog::new(BufferPool::new(64, 64), metrics.clone());
    log.process_upstream_delta(&delta(5, 2, &[0x02, 0x03])).unwrap();
    // nothing contiguous from offset 0 yet
    assert!(drain(&log, 5).is_empty());
    // a full re-send fills the hole; only the hole counts as new bytes
    log.process_upstream_delta(&delta(5, 0, &[0x00, 0x01, 0x02, 0x03])).unwrap();
    assert_eq!(drain(&log, 5), vec![0x00, 0x01, 0x02, 0x03]);
    assert_eq!(metrics.bytes_appended(), 4);
}

#[test]
fn fully_covered_deltas_are_discarded() {
    let metrics = Arc::new(CausalLogMetrics::new());
    let log = UpstreamThreadCausalLog::new(BufferPool::new(64, 64), metrics.clone());
    log.process_upstream_delta(&delta(5, 0, &[1, 2, 3, 4])).unwrap();
    log.process_upstream_delta(&delta(5, 0, &[1, 2])).unwrap();
    log.process_upstream_delta(&delta(5, 1, &[2, 3, 4])).unwrap();
    assert_eq!(metrics.stale_deltas_discarded(), 2);
    assert_eq!(drain(&log, 5), vec![1, 2, 3, 4]);
}

#[test]
fn delta_for_reclaimed_epoch_is_discarded_silently() {
    let log = upstream_log();
    log.process_upstream_delta(&delta(1, 0, &[1, 2])).unwrap();
    log.process_upstream_delta(&delta(2, 0, &[3])).unwrap();
    log.notify_checkpoint_complete(EpochId::new(2));

    log.process_upstream_delta(&delta(1, 0, &[1, 2])).unwrap();
    assert!(drain(&log, 1).is_empty());
    assert_eq!(drain(&log, 2), vec![3]);
}

#[test]
fn permuted_peer_streams_converge() {
    // two peers forward the same producer's log: one in fine-grained
    // cumulative steps, the other in one coarse delta per epoch
    let epoch_bytes: [&'static [u8]; 2] = [&[10, 11, 12, 13], &[20, 21]];
    let fine: Vec<ThreadLogDelta> = vec![
        delta(1, 0, &[10, 11]),
        delta(1, 2, &[12, 13]),
        delta(2, 0, &[20]),
        delta(2, 1, &[21]),
    ];
    let coarse: Vec<ThreadLogDelta> = vec![delta(1, 0, &[10, 11, 12, 13]), delta(2, 0, &[20, 21])];

    // interleave every which way; the post-state must not depend on order
    for split in 0..=fine.len() {
        let log = upstream_log();
        for d in &fine[..split] {
            log.process_upstream_delta(d).unwrap();
        }
        for d in &coarse {
            log.process_upstream_delta(d).unwrap();
        }
        for d in &fine[split..] {
            log.process_upstream_delta(d).unwrap();
        }
        assert_eq!(drain(&log, 1), epoch_bytes[0].to_vec());
        assert_eq!(drain(&log, 2), epoch_bytes[1].to_vec());
    }
}

#[test]
fn concurrent_peers_reach_the_same_state() {
    let log = Arc::new(upstream_log());
    let payload: Vec<u8> = (0..200u8).collect();

    let mut handles = Vec::new();
    for step in [1usize, 4, 25] {
        let log = Arc::clone(&log);
        let payload = payload.clone();
        handles.push(std::thread::spawn(move || {
            let mut sent = 0;
            while sent < payload.len() {
                let end = (sent + step).min(payload.len());
                let d = ThreadLogDelta::new(
                    EpochId::new(1),
                    sent as u64,
                    Bytes::copy_from_slice(&payload[sent..end]),
                );
                log.process_upstream_delta(&d).unwrap();
                sent = end;
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(drain(&log, 1), payload);
}

#[test]
fn bulk_read_spans_epochs_without_moving_cursors() {
    let log = upstream_log();
    log.process_upstream_delta(&delta(1, 0, &[1, 2])).unwrap();
    log.process_upstream_delta(&delta(2, 0, &[3, 4, 5])).unwrap();

    let all = log.determinants_from(EpochId::new(1)).unwrap();
    assert_eq!(all.epoch, EpochId::new(1));
    assert_eq!(all.offset_from_epoch, 0);
    assert_eq!(&all.bytes[..], &[1, 2, 3, 4, 5]);

    let from_two = log.determinants_from(EpochId::new(2)).unwrap();
    assert_eq!(from_two.epoch, EpochId::new(2));
    assert_eq!(&from_two.bytes[..], &[3, 4, 5]);

    assert!(log.determinants_from(EpochId::new(3)).is_none());

    // cursors were not disturbed
    assert_eq!(drain(&log, 1), vec![1, 2]);
}
