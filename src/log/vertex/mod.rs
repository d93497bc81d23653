//! Vertex causal logs.
//!
//! A vertex causal log bundles the thread logs belonging to one logical
//! vertex: the main-thread log plus one log per (partition, subpartition)
//! pair. The local flavor backs this replica's own vertex and routes each
//! consumer only the subpartition it actually reads; the upstream flavor
//! accumulates pre-flattened deltas received from peer replicas.

mod local;
mod upstream;

pub use local::LocalVertexCausalLog;
pub use upstream::UpstreamVertexCausalLog;
