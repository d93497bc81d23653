//! Upstream vertex causal log.

use crate::core::error::CausalLogResult;
use crate::core::ids::{ConsumerId, EpochId, PartitionId, PartitionKey, VertexId};
use crate::log::buffer::BufferPool;
use crate::log::delta::VertexLogDelta;
use crate::log::thread::{ThreadCausalLog, UpstreamThreadCausalLog};
use crate::ops::counters::CausalLogMetrics;
use dashmap::DashMap;
use std::sync::Arc;

/// Accumulated causal log of one upstream vertex.
///
/// Upstream determinants arrive pre-flattened from the producing replica:
/// one main-thread stream plus whichever subpartition streams the peers
/// forward. Subpartition logs are created lazily as their first deltas
/// arrive; the structure of the original vertex is preserved so recovery
/// responses and forwarded deltas keep their shape.
pub struct UpstreamVertexCausalLog {
    vertex: VertexId,
    main_log: UpstreamThreadCausalLog,
    subpartition_logs: DashMap<PartitionKey, Arc<UpstreamThreadCausalLog>>,
    pool: Arc<BufferPool>,
    metrics: Arc<CausalLogMetrics>,
}

impl UpstreamVertexCausalLog {
    /// Create an empty log for `vertex`.
    pub fn new(vertex: VertexId, pool: Arc<BufferPool>, metrics: Arc<CausalLogMetrics>) -> Self {
        Self {
            vertex,
            main_log: UpstreamThreadCausalLog::new(pool.clone(), metrics.clone()),
            subpartition_logs: DashMap::new(),
            pool,
            metrics,
        }
    }

    /// Id of the upstream vertex.
    pub fn vertex_id(&self) -> VertexId {
        self.vertex
    }

    /// Fold a received delta into the accumulated log.
    ///
    /// Safe to call concurrently from several network threads; catch-up is
    /// idempotent per thread log.
    pub fn process_upstream_delta(&self, delta: &VertexLogDelta) -> CausalLogResult<()> {
        debug_assert_eq!(delta.vertex, self.vertex);
        if let Some(main) = &delta.main {
            self.main_log.process_upstream_delta(main)?;
        }
        for (&partition, subs) in &delta.partitions {
            for (&subpartition, thread_delta) in subs {
                let key = PartitionKey::new(partition, subpartition);
                let log = self
                    .subpartition_logs
                    .entry(key)
                    .or_insert_with(|| {
                        Arc::new(UpstreamThreadCausalLog::new(
                            self.pool.clone(),
                            self.metrics.clone(),
                        ))
                    })
                    .clone();
                log.process_upstream_delta(thread_delta)?;
            }
        }
        Ok(())
    }

    /// Assemble the delta for `consumer` within `epoch` across the main
    /// log and every subpartition log, eliding empty deltas.
    pub fn next_delta_for_downstream(
        &self,
        consumer: ConsumerId,
        epoch: EpochId,
    ) -> VertexLogDelta {
        let mut delta = VertexLogDelta::new(self.vertex);

        let main = self.main_log.next_determinants_for_downstream(consumer, epoch);
        if !main.is_empty() {
            delta.main = Some(main);
        }
        for entry in self.subpartition_logs.iter() {
            let key = *entry.key();
            let sub = entry
                .value()
                .next_determinants_for_downstream(consumer, epoch);
            if !sub.is_empty() {
                delta.insert_subpartition(key.partition, key.subpartition, sub);
            }
        }

        delta
    }

    /// All retained bytes from `start_epoch` to the tip across all owned
    /// thread logs, preserving structure. Used for bulk recovery.
    pub fn get_determinants(&self, start_epoch: EpochId) -> VertexLogDelta {
        let mut delta = VertexLogDelta::new(self.vertex);

        if let Some(main) = self.main_log.determinants_from(start_epoch) {
            delta.main = Some(main);
        }
        for entry in self.subpartition_logs.iter() {
            let key = *entry.key();
            if let Some(sub) = entry.value().determinants_from(start_epoch) {
                delta.insert_subpartition(key.partition, key.subpartition, sub);
            }
        }

        delta
    }

    /// Record a downstream consumer registration.
    ///
    /// Upstream content is forwarded to every consumer regardless of the
    /// subpartition it reads, and cursors are created lazily on the first
    /// read, so registration is bookkeeping only.
    pub fn register_downstream_consumer(
        &self,
        consumer: ConsumerId,
        _partition: PartitionId,
        _subpartition: u32,
    ) {
        tracing::debug!(vertex = %self.vertex, %consumer, "registering downstream consumer");
    }

    /// Drop `consumer`'s cursors from every owned thread log.
    pub fn unregister_downstream_consumer(&self, consumer: ConsumerId) {
        self.main_log.unregister_consumer(consumer);
        for entry in self.subpartition_logs.iter() {
            entry.value().unregister_consumer(consumer);
        }
    }

    /// Broadcast checkpoint completion to every owned thread log.
    pub fn notify_checkpoint_complete(&self, checkpoint: EpochId) {
        self.main_log.notify_checkpoint_complete(checkpoint);
        for entry in self.subpartition_logs.iter() {
            entry.value().notify_checkpoint_complete(checkpoint);
        }
    }

    /// Reset `consumer`'s cursors for replay by a replacement replica.
    pub fn notify_downstream_failure(&self, consumer: ConsumerId) {
        self.main_log.notify_downstream_failure(consumer);
        for entry in self.subpartition_logs.iter() {
            entry.value().notify_downstream_failure(consumer);
        }
    }

    /// Close every owned thread log.
    pub fn close(&self) {
        self.main_log.close();
        for entry in self.subpartition_logs.iter() {
            entry.value().close();
        }
    }
}
