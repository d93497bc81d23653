//! Common test utilities.
//!
//! Shared helpers for integration tests. Import with `mod common;` in test
//! files.
#![allow(dead_code)]

use causalog::core::config::CausalConfig;
use causalog::log::job::{JobCausalLog, VertexGraphInfo, VertexLock};
use causalog::{BufferPool, Determinant, DeterminantEncoder, PartitionId, VertexId};
use std::collections::HashMap;
use std::sync::Arc;

/// Concatenated encoding of a determinant sequence.
pub fn encoded(determinants: &[Determinant]) -> Vec<u8> {
    let encoder = DeterminantEncoder::new();
    let mut out = Vec::new();
    for determinant in determinants {
        out.extend_from_slice(&encoder.encode(determinant));
    }
    out
}

/// Concatenated encoding of a sequence of RNG determinants.
pub fn rng_bytes(values: &[u32]) -> Vec<u8> {
    let determinants: Vec<Determinant> = values.iter().map(|&v| Determinant::Rng(v)).collect();
    encoded(&determinants)
}

/// The local vertex id used by job-level tests.
pub fn local_vertex() -> VertexId {
    VertexId::new(0x10)
}

/// The single output partition used by job-level tests.
pub fn partition() -> PartitionId {
    PartitionId::new(0xa0)
}

/// Build a job causal log for `vertex` with the given sharing depth and
/// upstream distances, producing one partition with two subpartitions.
pub fn job_log_for(
    vertex: VertexId,
    sharing_depth: i32,
    upstream: &[(VertexId, i32)],
) -> JobCausalLog {
    let mut distances = HashMap::new();
    distances.insert(vertex, 0);
    for &(upstream_vertex, distance) in upstream {
        distances.insert(upstream_vertex, distance);
    }
    let graph = VertexGraphInfo::new(vertex, distances, vec![(partition(), 2)]);
    let config = CausalConfig { sharing_depth };
    JobCausalLog::new(
        graph,
        &config,
        BufferPool::new(64, 256),
        Arc::new(VertexLock::new()),
    )
}

/// Build a job causal log for the default local vertex.
pub fn job_log(sharing_depth: i32, upstream: &[(VertexId, i32)]) -> JobCausalLog {
    job_log_for(local_vertex(), sharing_depth, upstream)
}
