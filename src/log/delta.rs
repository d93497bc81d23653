//! Delta types exchanged between replicas.
//!
//! A delta is the incremental portion of a causal log that a consumer has
//! not yet received. Thread-level deltas carry raw determinant bytes for a
//! single epoch; vertex-level deltas bundle the main-thread delta with the
//! subpartition deltas relevant to one consumer, keyed by vertex id so that
//! each delta is self-describing.

use crate::core::ids::{EpochId, PartitionId, VertexId};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Incremental bytes of one thread log within one epoch.
///
/// Immutable once constructed; the byte payload is reference-counted so an
/// in-flight network send stays valid after the log reclaims the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadLogDelta {
    /// Epoch the bytes belong to.
    pub epoch: EpochId,

    /// Logical offset of the first payload byte within the epoch.
    pub offset_from_epoch: u64,

    /// Raw determinant bytes.
    pub bytes: Bytes,
}

impl ThreadLogDelta {
    /// Create a delta.
    pub fn new(epoch: EpochId, offset_from_epoch: u64, bytes: Bytes) -> Self {
        Self {
            epoch,
            offset_from_epoch,
            bytes,
        }
    }

    /// An empty delta for `epoch`.
    pub fn empty(epoch: EpochId) -> Self {
        Self {
            epoch,
            offset_from_epoch: 0,
            bytes: Bytes::new(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the delta carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Logical offset one past the last payload byte within the epoch.
    pub fn end_offset(&self) -> u64 {
        self.offset_from_epoch + self.bytes.len() as u64
    }
}

/// Per-subpartition deltas of one partition, ordered by subpartition index.
pub type SubpartitionDeltas = BTreeMap<u32, ThreadLogDelta>;

/// All new determinant bytes of one vertex for one consumer.
///
/// The subpartition map holds only the subpartitions that causally affect
/// the consumer; empty thread deltas are elided entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLogDelta {
    /// Vertex the determinants belong to.
    pub vertex: VertexId,

    /// Main-thread delta, absent when empty.
    pub main: Option<ThreadLogDelta>,

    /// Subpartition deltas grouped by partition, ordered.
    pub partitions: BTreeMap<PartitionId, SubpartitionDeltas>,
}

impl VertexLogDelta {
    /// Create an empty delta for `vertex`.
    pub fn new(vertex: VertexId) -> Self {
        Self {
            vertex,
            main: None,
            partitions: BTreeMap::new(),
        }
    }

    /// Set the main-thread delta.
    pub fn with_main(mut self, delta: ThreadLogDelta) -> Self {
        self.main = Some(delta);
        self
    }

    /// Record a subpartition delta.
    pub fn insert_subpartition(
        &mut self,
        partition: PartitionId,
        subpartition: u32,
        delta: ThreadLogDelta,
    ) {
        self.partitions
            .entry(partition)
            .or_default()
            .insert(subpartition, delta);
    }

    /// Whether the delta carries any bytes.
    ///
    /// Callers test this before transmitting; empty deltas are never
    /// serialized on the wire.
    pub fn has_updates(&self) -> bool {
        self.main.as_ref().is_some_and(|d| !d.is_empty())
            || self
                .partitions
                .values()
                .any(|subs| subs.values().any(|d| !d.is_empty()))
    }

    /// Total payload bytes across the main and subpartition deltas.
    pub fn total_bytes(&self) -> usize {
        let main = self.main.as_ref().map_or(0, ThreadLogDelta::len);
        let subs: usize = self
            .partitions
            .values()
            .flat_map(|subs| subs.values())
            .map(ThreadLogDelta::len)
            .sum();
        main + subs
    }
}
