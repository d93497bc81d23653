//! Delta and recovery frame encoding.
//!
//! Layout per vertex delta, big-endian:
//!
//! ```text
//! vertex_id          : 16 bytes
//! has_main_delta     : 1 byte (0|1)
//! [ if has_main_delta:
//!     epoch_id           : 8 bytes
//!     offset_from_epoch  : varint
//!     length             : varint
//!     bytes              : length bytes ]
//! num_subpartition_groups : varint
//! for each group:
//!     partition_id       : 16 bytes
//!     num_subparts       : varint
//!     for each subpart:
//!         sub_index         : varint
//!         epoch_id          : 8 bytes
//!         offset_from_epoch : varint
//!         length            : varint
//!         bytes             : length bytes
//! ```
//!
//! A message carries a list of vertex deltas by varint-prefixing the list.

use super::varint::{get_varint, put_varint};
use super::{DeterminantRequest, DeterminantResponse};
use crate::core::error::{CausalLogError, CausalLogResult};
use crate::core::ids::{EpochId, PartitionId, VertexId};
use crate::log::delta::{ThreadLogDelta, VertexLogDelta};
use bytes::{Buf, BufMut, BytesMut};

fn need(buf: &impl Buf, n: usize) -> CausalLogResult<()> {
    if buf.remaining() < n {
        Err(CausalLogError::truncated(n - buf.remaining()))
    } else {
        Ok(())
    }
}

fn get_id_bytes(buf: &mut impl Buf) -> CausalLogResult<[u8; 16]> {
    need(buf, 16)?;
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(bytes)
}

fn put_thread_delta(buf: &mut BytesMut, delta: &ThreadLogDelta) {
    buf.put_u64(delta.epoch.0);
    put_varint(buf, delta.offset_from_epoch);
    put_varint(buf, delta.bytes.len() as u64);
    buf.put_slice(&delta.bytes);
}

fn get_thread_delta(buf: &mut impl Buf) -> CausalLogResult<ThreadLogDelta> {
    need(buf, 8)?;
    let epoch = EpochId::new(buf.get_u64());
    let offset_from_epoch = get_varint(buf)?;
    let length = get_varint(buf)? as usize;
    need(buf, length)?;
    let bytes = buf.copy_to_bytes(length);
    Ok(ThreadLogDelta::new(epoch, offset_from_epoch, bytes))
}

/// Encode one vertex delta.
pub fn encode_vertex_delta(delta: &VertexLogDelta, buf: &mut BytesMut) {
    buf.put_slice(&delta.vertex.to_bytes());
    match &delta.main {
        Some(main) => {
            buf.put_u8(1);
            put_thread_delta(buf, main);
        }
        None => buf.put_u8(0),
    }
    put_varint(buf, delta.partitions.len() as u64);
    for (partition, subs) in &delta.partitions {
        buf.put_slice(&partition.to_bytes());
        put_varint(buf, subs.len() as u64);
        for (&sub_index, thread_delta) in subs {
            put_varint(buf, u64::from(sub_index));
            put_thread_delta(buf, thread_delta);
        }
    }
}

/// Decode one vertex delta.
pub fn decode_vertex_delta(buf: &mut impl Buf) -> CausalLogResult<VertexLogDelta> {
    let vertex = VertexId::from_bytes(get_id_bytes(buf)?);
    let mut delta = VertexLogDelta::new(vertex);

    need(buf, 1)?;
    match buf.get_u8() {
        0 => {}
        1 => delta.main = Some(get_thread_delta(buf)?),
        other => {
            return Err(CausalLogError::malformed(format!(
                "has_main_delta must be 0 or 1, got {other}"
            )))
        }
    }

    let num_groups = get_varint(buf)?;
    for _ in 0..num_groups {
        let partition = PartitionId::from_bytes(get_id_bytes(buf)?);
        let num_subparts = get_varint(buf)?;
        for _ in 0..num_subparts {
            let sub_index = get_varint(buf)?;
            let sub_index = u32::try_from(sub_index)
                .map_err(|_| CausalLogError::malformed("subpartition index overflows u32"))?;
            let thread_delta = get_thread_delta(buf)?;
            delta.insert_subpartition(partition, sub_index, thread_delta);
        }
    }
    Ok(delta)
}

/// Encode a list of vertex deltas, varint-prefixed with the count.
pub fn encode_delta_list(deltas: &[VertexLogDelta], buf: &mut BytesMut) {
    put_varint(buf, deltas.len() as u64);
    for delta in deltas {
        encode_vertex_delta(delta, buf);
    }
}

/// Decode a varint-prefixed list of vertex deltas.
pub fn decode_delta_list(buf: &mut impl Buf) -> CausalLogResult<Vec<VertexLogDelta>> {
    let count = get_varint(buf)?;
    let mut deltas = Vec::new();
    for _ in 0..count {
        deltas.push(decode_vertex_delta(buf)?);
    }
    Ok(deltas)
}

/// Encode a bulk recovery request.
pub fn encode_determinant_request(request: &DeterminantRequest, buf: &mut BytesMut) {
    buf.put_slice(&request.vertex.to_bytes());
    buf.put_u64(request.start_epoch.0);
}

/// Decode a bulk recovery request.
pub fn decode_determinant_request(buf: &mut impl Buf) -> CausalLogResult<DeterminantRequest> {
    let vertex = VertexId::from_bytes(get_id_bytes(buf)?);
    need(buf, 8)?;
    let start_epoch = EpochId::new(buf.get_u64());
    Ok(DeterminantRequest::new(vertex, start_epoch))
}

/// Encode a bulk recovery response.
pub fn encode_determinant_response(response: &DeterminantResponse, buf: &mut BytesMut) {
    buf.put_u8(u8::from(response.found));
    buf.put_slice(&response.vertex.to_bytes());
    match &response.payload {
        Some(payload) => {
            buf.put_u8(1);
            encode_vertex_delta(payload, buf);
        }
        None => buf.put_u8(0),
    }
}

/// Decode a bulk recovery response.
pub fn decode_determinant_response(buf: &mut impl Buf) -> CausalLogResult<DeterminantResponse> {
    need(buf, 1)?;
    let found = match buf.get_u8() {
        0 => false,
        1 => true,
        other => {
            return Err(CausalLogError::malformed(format!(
                "found must be 0 or 1, got {other}"
            )))
        }
    };
    let vertex = VertexId::from_bytes(get_id_bytes(buf)?);
    need(buf, 1)?;
    let payload = match buf.get_u8() {
        0 => None,
        1 => Some(decode_vertex_delta(buf)?),
        other => {
            return Err(CausalLogError::malformed(format!(
                "payload marker must be 0 or 1, got {other}"
            )))
        }
    };
    Ok(DeterminantResponse {
        found,
        vertex,
        payload,
    })
}
