//! Upstream (multi-producer) thread causal log.

use super::{CatchUpOutcome, ThreadCausalLog, ThreadLogCore};
use crate::core::error::CausalLogResult;
use crate::core::ids::{ConsumerId, EpochId};
use crate::log::buffer::BufferPool;
use crate::log::delta::ThreadLogDelta;
use crate::ops::counters::CausalLogMetrics;
use std::sync::Arc;

/// Thread log accumulating deltas that arrive concurrently from peer
/// replicas.
///
/// Multiple network threads may deliver deltas for the same upstream
/// producer. Catch-up is idempotent: a delta whose bytes the log already
/// holds is discarded, and concurrent overlapping deltas for one epoch
/// converge to the same post-state regardless of arrival order. Writers
/// are serialized on the internal write lock; delta readers share the read
/// side and never block one another.
pub struct UpstreamThreadCausalLog {
    core: ThreadLogCore,
}

impl UpstreamThreadCausalLog {
    /// Create a log drawing storage from `pool`.
    pub fn new(pool: Arc<BufferPool>, metrics: Arc<CausalLogMetrics>) -> Self {
        Self {
            core: ThreadLogCore::new(pool, metrics),
        }
    }

    /// Apply `delta` to its epoch, creating the epoch slice lazily on the
    /// first delta that mentions it.
    ///
    /// Bytes at offsets the log already holds are discarded silently; a
    /// delta for an epoch reclaimed on this receiver is discarded silently
    /// as well.
    pub fn process_upstream_delta(&self, delta: &ThreadLogDelta) -> CausalLogResult<()> {
        let outcome = self.core.with_state_mut(|state| {
            if state.closed {
                return Ok(CatchUpOutcome::Stale);
            }
            state.apply_catch_up(delta.epoch, delta.offset_from_epoch, &delta.bytes)
        })?;
        match outcome {
            CatchUpOutcome::Applied { new_bytes } => {
                self.core.metrics().add_bytes_appended(new_bytes);
            }
            CatchUpOutcome::Stale => {
                self.core.metrics().inc_stale_deltas_discarded();
            }
            CatchUpOutcome::Rejected => {
                tracing::warn!(
                    epoch = %delta.epoch,
                    offset = delta.offset_from_epoch,
                    len = delta.len(),
                    "discarding upstream delta outside its epoch region"
                );
                self.core.metrics().inc_malformed_deltas_discarded();
            }
        }
        Ok(())
    }
}

impl ThreadCausalLog for UpstreamThreadCausalLog {
    fn next_determinants_for_downstream(
        &self,
        consumer: ConsumerId,
        epoch: EpochId,
    ) -> ThreadLogDelta {
        self.core.next_delta(consumer, epoch)
    }

    fn determinants_from(&self, start_epoch: EpochId) -> Option<ThreadLogDelta> {
        self.core.determinants_from(start_epoch)
    }

    fn notify_checkpoint_complete(&self, checkpoint: EpochId) {
        self.core.notify_checkpoint_complete(checkpoint);
    }

    fn notify_downstream_failure(&self, consumer: ConsumerId) {
        self.core.notify_downstream_failure(consumer);
    }

    fn unregister_consumer(&self, consumer: ConsumerId) {
        self.core.unregister_consumer(consumer);
    }

    fn log_length(&self) -> usize {
        self.core.log_length()
    }

    fn close(&self) {
        self.core.close();
    }
}
