//! Local vertex causal log.

use crate::core::error::{CausalLogError, CausalLogResult};
use crate::core::ids::{ConsumerId, EpochId, PartitionId, PartitionKey, VertexId};
use crate::determinant::{Determinant, DeterminantEncoder};
use crate::log::buffer::BufferPool;
use crate::log::delta::VertexLogDelta;
use crate::log::thread::{LocalThreadCausalLog, ThreadCausalLog};
use crate::ops::counters::CausalLogMetrics;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Causal log of this replica's own vertex.
///
/// Owns the main-thread log and one log per output subpartition, all fixed
/// at construction. A consumer is causally affected only by the
/// subpartition it reads plus the main-thread determinants, so deltas for
/// a consumer carry exactly those two logs.
pub struct LocalVertexCausalLog {
    vertex: VertexId,
    main_thread_log: LocalThreadCausalLog,
    subpartition_logs: HashMap<PartitionKey, LocalThreadCausalLog>,
    consumer_partitions: DashMap<ConsumerId, PartitionKey>,
}

impl LocalVertexCausalLog {
    /// Create the log for `vertex` producing the given partitions, each
    /// with its number of subpartitions.
    pub fn new(
        vertex: VertexId,
        output_partitions: &[(PartitionId, u32)],
        pool: Arc<BufferPool>,
        encoder: DeterminantEncoder,
        metrics: Arc<CausalLogMetrics>,
    ) -> Self {
        let mut subpartition_logs = HashMap::new();
        for &(partition, subpartitions) in output_partitions {
            for subpartition in 0..subpartitions {
                subpartition_logs.insert(
                    PartitionKey::new(partition, subpartition),
                    LocalThreadCausalLog::new(pool.clone(), encoder, metrics.clone()),
                );
            }
        }
        Self {
            vertex,
            main_thread_log: LocalThreadCausalLog::new(pool, encoder, metrics),
            subpartition_logs,
            consumer_partitions: DashMap::new(),
        }
    }

    /// Id of the vertex being logged.
    pub fn vertex_id(&self) -> VertexId {
        self.vertex
    }

    /// Append a main-thread determinant.
    ///
    /// Must be called with the vertex lock held.
    pub fn append_determinant(
        &self,
        determinant: &Determinant,
        epoch: EpochId,
    ) -> CausalLogResult<()> {
        self.main_thread_log.append_determinant(determinant, epoch)
    }

    /// Append a determinant to one output subpartition's log.
    ///
    /// Must be called with the vertex lock held.
    pub fn append_subpartition_determinant(
        &self,
        determinant: &Determinant,
        epoch: EpochId,
        partition: PartitionId,
        subpartition: u32,
    ) -> CausalLogResult<()> {
        let key = PartitionKey::new(partition, subpartition);
        let log = self
            .subpartition_logs
            .get(&key)
            .ok_or(CausalLogError::UnknownPartition { key })?;
        log.append_determinant(determinant, epoch)
    }

    /// Record which subpartition `consumer` reads.
    ///
    /// The consumer is not registered with the other subpartitions: it is
    /// not causally affected by their state. Cursor creation is deferred to
    /// the first read.
    pub fn register_downstream_consumer(
        &self,
        consumer: ConsumerId,
        partition: PartitionId,
        subpartition: u32,
    ) {
        let key = PartitionKey::new(partition, subpartition);
        debug_assert!(
            self.subpartition_logs.contains_key(&key),
            "consumer registered for unknown subpartition {key}"
        );
        self.consumer_partitions.insert(consumer, key);
    }

    /// Remove `consumer`'s mapping and drop its cursors from every thread
    /// log holding one.
    pub fn unregister_downstream_consumer(&self, consumer: ConsumerId) {
        self.consumer_partitions.remove(&consumer);
        self.main_thread_log.unregister_consumer(consumer);
        for log in self.subpartition_logs.values() {
            log.unregister_consumer(consumer);
        }
    }

    /// Assemble the delta for `consumer` within `epoch`: the main-thread
    /// delta plus the one subpartition delta relevant to the consumer,
    /// with empty deltas elided.
    pub fn next_delta_for_downstream(
        &self,
        consumer: ConsumerId,
        epoch: EpochId,
    ) -> VertexLogDelta {
        let mut delta = VertexLogDelta::new(self.vertex);

        let main = self
            .main_thread_log
            .next_determinants_for_downstream(consumer, epoch);
        if !main.is_empty() {
            delta.main = Some(main);
        }

        if let Some(key) = self.consumer_partitions.get(&consumer).map(|e| *e.value()) {
            if let Some(log) = self.subpartition_logs.get(&key) {
                let sub = log.next_determinants_for_downstream(consumer, epoch);
                if !sub.is_empty() {
                    delta.insert_subpartition(key.partition, key.subpartition, sub);
                }
            }
        }

        delta
    }

    /// Broadcast checkpoint completion to every owned thread log.
    pub fn notify_checkpoint_complete(&self, checkpoint: EpochId) {
        self.main_thread_log.notify_checkpoint_complete(checkpoint);
        for log in self.subpartition_logs.values() {
            log.notify_checkpoint_complete(checkpoint);
        }
    }

    /// Reset `consumer`'s cursors for replay by a replacement replica.
    pub fn notify_downstream_failure(&self, consumer: ConsumerId) {
        self.main_thread_log.notify_downstream_failure(consumer);
        if let Some(key) = self.consumer_partitions.get(&consumer).map(|e| *e.value()) {
            if let Some(log) = self.subpartition_logs.get(&key) {
                log.notify_downstream_failure(consumer);
            }
        }
    }

    /// Live bytes in the main-thread log.
    pub fn main_thread_log_length(&self) -> usize {
        self.main_thread_log.log_length()
    }

    /// Live bytes in one subpartition's log, if the vertex produces it.
    pub fn subpartition_log_length(
        &self,
        partition: PartitionId,
        subpartition: u32,
    ) -> Option<usize> {
        self.subpartition_logs
            .get(&PartitionKey::new(partition, subpartition))
            .map(ThreadCausalLog::log_length)
    }

    /// Close every owned thread log.
    pub fn close(&self) {
        self.main_thread_log.close();
        for log in self.subpartition_logs.values() {
            log.close();
        }
    }
}
