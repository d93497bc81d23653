//! Wire formats for delta exchange and bulk recovery.
//!
//! Deltas are piggybacked on data messages by the connection multiplexer;
//! this module fixes the byte layout it frames. All multi-byte integers
//! are big-endian; lengths and counts are LEB128 varints.

mod codec;
mod varint;

pub use codec::{
    decode_delta_list, decode_determinant_request, decode_determinant_response,
    decode_vertex_delta, encode_delta_list, encode_determinant_request,
    encode_determinant_response, encode_vertex_delta,
};
pub use varint::{get_varint, put_varint, varint_len};

use crate::core::ids::{EpochId, VertexId};
use crate::log::delta::VertexLogDelta;

/// Bulk recovery request: every determinant of `vertex` from
/// `start_epoch` to the tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeterminantRequest {
    /// Vertex whose determinants are requested.
    pub vertex: VertexId,

    /// First epoch of interest.
    pub start_epoch: EpochId,
}

impl DeterminantRequest {
    /// Create a request.
    pub fn new(vertex: VertexId, start_epoch: EpochId) -> Self {
        Self {
            vertex,
            start_epoch,
        }
    }
}

/// Answer to a [`DeterminantRequest`].
///
/// `found == false` signals that the vertex lies outside this replica's
/// sharing depth and the requester must ask another replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminantResponse {
    /// Whether this replica shares the requested vertex's determinants.
    pub found: bool,

    /// Vertex the response refers to.
    pub vertex: VertexId,

    /// Accumulated determinants, absent when `found` is false or nothing
    /// is retained.
    pub payload: Option<VertexLogDelta>,
}

impl DeterminantResponse {
    /// A positive response. An empty payload is elided.
    pub fn found(vertex: VertexId, payload: VertexLogDelta) -> Self {
        Self {
            found: true,
            vertex,
            payload: payload.has_updates().then_some(payload),
        }
    }

    /// A negative response: the vertex is outside this replica's sharing
    /// depth.
    pub fn not_found(vertex: VertexId) -> Self {
        Self {
            found: false,
            vertex,
            payload: None,
        }
    }
}
