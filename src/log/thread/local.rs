//! Local (single-producer) thread causal log.

use super::{ThreadCausalLog, ThreadLogCore};
use crate::core::error::CausalLogResult;
use crate::core::ids::{ConsumerId, EpochId};
use crate::determinant::{Determinant, DeterminantEncoder};
use crate::log::buffer::BufferPool;
use crate::log::delta::ThreadLogDelta;
use crate::ops::counters::CausalLogMetrics;
use bytes::BytesMut;
use std::sync::Arc;

/// Append-only byte log fed by one producer thread.
///
/// Appends are serialized by the external per-vertex lock held by the
/// producer; the internal read-write lock only shields concurrent delta
/// readers on network threads from in-progress writes.
pub struct LocalThreadCausalLog {
    core: ThreadLogCore,
    encoder: DeterminantEncoder,
}

impl LocalThreadCausalLog {
    /// Create a log drawing storage from `pool`.
    pub fn new(
        pool: Arc<BufferPool>,
        encoder: DeterminantEncoder,
        metrics: Arc<CausalLogMetrics>,
    ) -> Self {
        Self {
            core: ThreadLogCore::new(pool, metrics.clone()),
            encoder,
        }
    }

    /// Encode `determinant` and append it to `epoch`, opening a new slice
    /// pinned at the current writer position on the first write within the
    /// epoch.
    ///
    /// Must be called with the vertex lock held.
    pub fn append_determinant(
        &self,
        determinant: &Determinant,
        epoch: EpochId,
    ) -> CausalLogResult<()> {
        let mut encoded = BytesMut::with_capacity(self.encoder.encoded_len(determinant));
        self.encoder.encode_into(determinant, &mut encoded);
        let appended = self.core.with_state_mut(|state| {
            if state.closed {
                return Ok(false);
            }
            state.append_to_epoch(epoch, &encoded)?;
            Ok(true)
        })?;
        if appended {
            self.core.metrics().inc_determinants_appended();
            self.core.metrics().add_bytes_appended(encoded.len() as u64);
        }
        Ok(())
    }
}

impl ThreadCausalLog for LocalThreadCausalLog {
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
