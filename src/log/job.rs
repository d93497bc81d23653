//! Job causal log: the top-level composition.
//!
//! Owns this replica's local vertex log and one upstream vertex log per
//! peer that has sent determinants, applies the sharing-depth filter when
//! assembling deltas and answering recovery requests, and fans
//! checkpoint-complete notifications out to every owned log.
//!
//! Three thread populations touch this type concurrently: the vertex's
//! producer thread (appends, under the vertex lock), network I/O threads
//! (delta processing, delta assembly, recovery requests), and the
//! checkpoint coordinator (completion notifications).

use crate::core::config::CausalConfig;
use crate::core::error::CausalLogResult;
use crate::core::ids::{ConsumerId, EpochId, PartitionId, VertexId};
use crate::determinant::{Determinant, DeterminantEncoder};
use crate::log::buffer::BufferPool;
use crate::log::delta::VertexLogDelta;
use crate::log::vertex::{LocalVertexCausalLog, UpstreamVertexCausalLog};
use crate::ops::counters::CausalLogMetrics;
use crate::wire::DeterminantResponse;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The per-vertex producer lock, shared with the operator runtime.
///
/// The runtime already serializes the produce path on one mutex; the causal
/// log must not introduce a second lock on the same critical section, so it
/// accepts this one and requires a [`VertexLockGuard`] as proof of holding
/// on every append.
#[derive(Debug, Default)]
pub struct VertexLock {
    inner: Mutex<()>,
}

impl VertexLock {
    /// Create a lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock.
    pub fn lock(&self) -> VertexLockGuard<'_> {
        VertexLockGuard {
            lock: self,
            _guard: self.inner.lock(),
        }
    }
}

/// Proof that the vertex lock is held.
pub struct VertexLockGuard<'a> {
    lock: &'a VertexLock,
    _guard: MutexGuard<'a, ()>,
}

impl VertexLockGuard<'_> {
    /// Whether this guard guards `lock`.
    pub fn guards(&self, lock: &VertexLock) -> bool {
        std::ptr::eq(self.lock, lock)
    }
}

/// Static graph knowledge the causal log needs about its vertex.
#[derive(Debug, Clone)]
pub struct VertexGraphInfo {
    /// Id of the local vertex.
    pub vertex_id: VertexId,

    /// Topological distance to every reachable vertex: negative upstream,
    /// positive downstream, zero for the local vertex.
    pub distances: HashMap<VertexId, i32>,

    /// Output partitions of the local vertex with their subpartition
    /// counts.
    pub output_partitions: Vec<(PartitionId, u32)>,
}

impl VertexGraphInfo {
    /// Create graph info for `vertex_id`.
    pub fn new(
        vertex_id: VertexId,
        distances: HashMap<VertexId, i32>,
        output_partitions: Vec<(PartitionId, u32)>,
    ) -> Self {
        Self {
            vertex_id,
            distances,
            output_partitions,
        }
    }
}

/// Causal log for one task: the local vertex's log federated with the logs
/// of its upstream vertices.
pub struct JobCausalLog {
    local: LocalVertexCausalLog,
    upstream: DashMap<VertexId, Arc<UpstreamVertexCausalLog>>,
    distances: HashMap<VertexId, i32>,
    sharing_depth: i32,
    lock: Arc<VertexLock>,
    pool: Arc<BufferPool>,
    metrics: Arc<CausalLogMetrics>,
    closed: AtomicBool,
}

impl JobCausalLog {
    /// Create the log for the vertex described by `graph`.
    ///
    /// `lock` is the pre-existing vertex-wide producer lock; `pool` is the
    /// task-scoped buffer pool, owned by this log and destroyed lazily on
    /// close.
    pub fn new(
        graph: VertexGraphInfo,
        config: &CausalConfig,
        pool: Arc<BufferPool>,
        lock: Arc<VertexLock>,
    ) -> Self {
        tracing::info!(
            vertex = %graph.vertex_id,
            sharing_depth = config.sharing_depth,
            upstream_vertices = graph.distances.values().filter(|&&d| d < 0).count(),
            "creating job causal log"
        );
        let metrics = Arc::new(CausalLogMetrics::new());
        let local = LocalVertexCausalLog::new(
            graph.vertex_id,
            &graph.output_partitions,
            pool.clone(),
            DeterminantEncoder::new(),
            metrics.clone(),
        );
        Self {
            local,
            // upstream logs are created lazily so no reachability analysis
            // is needed up front
            upstream: DashMap::new(),
            distances: graph.distances,
            sharing_depth: config.sharing_depth,
            lock,
            pool,
            metrics,
            closed: AtomicBool::new(false),
        }
    }

    /// Id of the local vertex.
    pub fn vertex_id(&self) -> VertexId {
        self.local.vertex_id()
    }

    /// The shared vertex lock.
    pub fn vertex_lock(&self) -> &Arc<VertexLock> {
        &self.lock
    }

    /// Observability counters for this task's logs.
    pub fn metrics(&self) -> &CausalLogMetrics {
        &self.metrics
    }

    /// Append a main-thread determinant to the local log.
    ///
    /// The caller must hold the vertex lock; `guard` is the proof.
    pub fn append_determinant(
        &self,
        determinant: &Determinant,
        epoch: EpochId,
        guard: &VertexLockGuard<'_>,
    ) -> CausalLogResult<()> {
        debug_assert!(guard.guards(&self.lock), "guard from a different vertex");
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.local.append_determinant(determinant, epoch)
    }

    /// Append a determinant to one output subpartition's log.
    ///
    /// The caller must hold the vertex lock; `guard` is the proof.
    pub fn append_subpartition_determinant(
        &self,
        determinant: &Determinant,
        epoch: EpochId,
        partition: PartitionId,
        subpartition: u32,
        guard: &VertexLockGuard<'_>,
    ) -> CausalLogResult<()> {
        debug_assert!(guard.guards(&self.lock), "guard from a different vertex");
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.local
            .append_subpartition_determinant(determinant, epoch, partition, subpartition)
    }

    /// Fold a delta received from a peer into the upstream log of its
    /// vertex, creating that log lazily.
    ///
    /// Safe to call from network threads concurrently with producer
    /// appends.
    pub fn process_upstream_vertex_delta(&self, delta: &VertexLogDelta) -> CausalLogResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.upstream_log(delta.vertex).process_upstream_delta(delta)
    }

    /// Register a downstream consumer reading `subpartition` of
    /// `partition`, on the local log and on every current upstream log.
    pub fn register_downstream_consumer(
        &self,
        consumer: ConsumerId,
        partition: PartitionId,
        subpartition: u32,
    ) {
        tracing::debug!(%consumer, %partition, subpartition, "registering downstream consumer");
        self.local
            .register_downstream_consumer(consumer, partition, subpartition);
        for entry in self.upstream.iter() {
            entry
                .value()
                .register_downstream_consumer(consumer, partition, subpartition);
        }
    }

    /// Remove a downstream consumer and its cursors everywhere.
    pub fn unregister_downstream_consumer(&self, consumer: ConsumerId) {
        tracing::debug!(%consumer, "unregistering downstream consumer");
        self.local.unregister_downstream_consumer(consumer);
        for entry in self.upstream.iter() {
            entry.value().unregister_downstream_consumer(consumer);
        }
    }

    /// Answer a bulk recovery request for `vertex`'s determinants from
    /// `start_epoch` to the tip.
    ///
    /// Outside the sharing depth the response is negative and the
    /// requester must ask another replica. Otherwise an empty upstream log
    /// is created if none exists, so that deltas streamed later land
    /// somewhere.
    pub fn respond_to_determinant_request(
        &self,
        vertex: VertexId,
        start_epoch: EpochId,
    ) -> DeterminantResponse {
        tracing::debug!(%vertex, %start_epoch, "determinant request");
        if self.closed.load(Ordering::Acquire) {
            // shutting down; the requester should ask another replica
            return DeterminantResponse::not_found(vertex);
        }
        if self.sharing_depth != -1 {
            let in_depth = self
                .distances
                .get(&vertex)
                .is_some_and(|d| d.abs() <= self.sharing_depth);
            if !in_depth {
                return DeterminantResponse::not_found(vertex);
            }
        }
        let payload = self.upstream_log(vertex).get_determinants(start_epoch);
        DeterminantResponse::found(vertex, payload)
    }

    /// Assemble the deltas to piggyback to `consumer` for `epoch`: every
    /// in-depth upstream vertex's new bytes plus, unless the depth is zero,
    /// the local vertex's own.
    pub fn next_deltas_for_downstream(
        &self,
        consumer: ConsumerId,
        epoch: EpochId,
    ) -> Vec<VertexLogDelta> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        let mut deltas = Vec::new();
        for entry in self.upstream.iter() {
            let vertex = *entry.key();
            // forwarding adds a hop, hence the +1
            let in_depth = self.sharing_depth == -1
                || self
                    .distances
                    .get(&vertex)
                    .is_some_and(|d| d.abs() + 1 <= self.sharing_depth);
            if !in_depth {
                continue;
            }
            let delta = entry.value().next_delta_for_downstream(consumer, epoch);
            if delta.has_updates() {
                deltas.push(delta);
            }
        }
        if self.sharing_depth != 0 {
            let delta = self.local.next_delta_for_downstream(consumer, epoch);
            if delta.has_updates() {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Broadcast checkpoint completion to the local log and every upstream
    /// log.
    ///
    /// Reclamation on upstream logs may lag the producing replica's own by
    /// however long its completion notification trails; the consumer-side
    /// cursor discipline keeps that safe.
    pub fn notify_checkpoint_complete(&self, checkpoint: EpochId) {
        tracing::debug!(%checkpoint, "checkpoint complete");
        for entry in self.upstream.iter() {
            entry.value().notify_checkpoint_complete(checkpoint);
        }
        self.local.notify_checkpoint_complete(checkpoint);
    }

    /// Reset `consumer`'s cursors everywhere so a replacement replica is
    /// replayed from the oldest retained determinants.
    pub fn notify_downstream_failure(&self, consumer: ConsumerId) {
        tracing::debug!(%consumer, "downstream failure; rewinding cursors");
        self.local.notify_downstream_failure(consumer);
        for entry in self.upstream.iter() {
            entry.value().notify_downstream_failure(consumer);
        }
    }

    /// Live bytes in the local main-thread log.
    pub fn main_thread_log_length(&self) -> usize {
        self.local.main_thread_log_length()
    }

    /// Live bytes in one local subpartition log.
    pub fn subpartition_log_length(
        &self,
        partition: PartitionId,
        subpartition: u32,
    ) -> Option<usize> {
        self.local.subpartition_log_length(partition, subpartition)
    }

    /// Close every owned log and lazily destroy the buffer pool.
    ///
    /// Idempotent. In-flight sends holding delta bytes remain valid; the
    /// pool stops handing out segments.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(vertex = %self.vertex_id(), "closing job causal log");
        self.local.close();
        for entry in self.upstream.iter() {
            entry.value().close();
        }
        self.pool.lazy_destroy();
    }

    fn upstream_log(&self, vertex: VertexId) -> Arc<UpstreamVertexCausalLog> {
        self.upstream
            .entry(vertex)
            .or_insert_with(|| {
                Arc::new(UpstreamVertexCausalLog::new(
                    vertex,
                    self.pool.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone()
    }
}

impl Drop for JobCausalLog {
    fn drop(&mut self) {
        self.close();
    }
}
