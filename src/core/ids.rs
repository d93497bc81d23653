//! Typed identifiers for the causal log.
//!
//! All identifiers are opaque: the core never interprets their contents
//! beyond equality, ordering, and wire encoding. Vertex and partition ids
//! are 128-bit values assigned by the job scheduler; consumer ids identify
//! a single downstream input channel for the lifetime of its registration.

use serde::{Deserialize, Serialize};

/// Identifier of a logical vertex in the dataflow graph.
///
/// Stable for the lifetime of the job. Encoded as 16 big-endian bytes on
/// the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VertexId(pub u128);

impl VertexId {
    /// Create a vertex id from a raw 128-bit value.
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Big-endian byte representation used on the wire.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Reconstruct a vertex id from its wire representation.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Identifier of an intermediate-result partition produced by a vertex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PartitionId(pub u128);

impl PartitionId {
    /// Create a partition id from a raw 128-bit value.
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Big-endian byte representation used on the wire.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Reconstruct a partition id from its wire representation.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Identifier of a downstream consumer (one input channel).
///
/// Created on registration, destroyed on unregistration or cancel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ConsumerId(pub u64);

impl ConsumerId {
    /// Create a consumer id from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Identifier of a checkpoint epoch.
///
/// Monotonically issued by the checkpoint coordinator; one per completed
/// barrier. An epoch identifies the interval between two successive
/// barriers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EpochId(pub u64);

impl EpochId {
    /// Create an epoch id from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The epoch id preceding this one, saturating at zero.
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl std::fmt::Display for EpochId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch-{}", self.0)
    }
}

/// A (partition, subpartition) pair addressing one output subpartition of
/// the local vertex. Fixed at vertex construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PartitionKey {
    /// The intermediate-result partition.
    pub partition: PartitionId,

    /// Subpartition index within the partition.
    pub subpartition: u32,
}

impl PartitionKey {
    /// Create a partition key.
    pub const fn new(partition: PartitionId, subpartition: u32) -> Self {
        Self {
            partition,
            subpartition,
        }
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition, self.subpartition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_id_byte_round_trip() {
        let id = VertexId::new(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        assert_eq!(VertexId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn vertex_id_bytes_are_big_endian() {
        let id = VertexId::new(1);
        let bytes = id.to_bytes();
        assert_eq!(bytes[15], 1);
        assert!(bytes[..15].iter().all(|&b| b == 0));
    }

    #[test]
    fn epoch_prev_saturates() {
        assert_eq!(EpochId::new(0).prev(), EpochId::new(0));
        assert_eq!(EpochId::new(7).prev(), EpochId::new(6));
    }

    #[test]
    fn display_formats() {
        assert_eq!(ConsumerId::new(3).to_string(), "consumer-3");
        assert_eq!(EpochId::new(42).to_string(), "epoch-42");
        let key = PartitionKey::new(PartitionId::new(0xab), 2);
        assert!(key.to_string().ends_with("ab/2"));
    }
}
