//! Determinant encoder and decoder.
//!
//! One byte of tag, then a fixed big-endian payload per variant. The same
//! encoder instance is shared by every thread log of a vertex so that all
//! replicas of a job agree on the byte layout.

use super::{Determinant, TimerCallback};
use crate::core::error::{CausalLogError, CausalLogResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const TAG_RNG: u8 = 0x01;
const TAG_TIMER: u8 = 0x02;
const TAG_BUFFER: u8 = 0x03;
const TAG_SOURCE_CHECKPOINT: u8 = 0x04;
const TAG_TIMESTAMP: u8 = 0x05;

/// Encodes determinants to their wire form and back.
///
/// Stateless; cheap to copy. The decoder is the exact inverse of the
/// encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterminantEncoder;

impl DeterminantEncoder {
    /// Create an encoder.
    pub const fn new() -> Self {
        Self
    }

    /// Number of bytes `determinant` occupies when encoded.
    pub const fn encoded_len(&self, determinant: &Determinant) -> usize {
        1 + match determinant {
            Determinant::Rng(_) => 4,
            Determinant::Timer { .. } => 9,
            Determinant::Buffer { .. } => 9,
            Determinant::SourceCheckpoint { .. } => 8,
            Determinant::Timestamp(_) => 8,
        }
    }

    /// Append the encoding of `determinant` to `buf`.
    pub fn encode_into(&self, determinant: &Determinant, buf: &mut BytesMut) {
        match *determinant {
            Determinant::Rng(value) => {
                buf.put_u8(TAG_RNG);
                buf.put_u32(value);
            }
            Determinant::Timer {
                timestamp,
                callback,
            } => {
                buf.put_u8(TAG_TIMER);
                buf.put_u64(timestamp);
                buf.put_u8(callback.as_u8());
            }
            Determinant::Buffer { sequence, kind } => {
                buf.put_u8(TAG_BUFFER);
                buf.put_u64(sequence);
                buf.put_u8(kind);
            }
            Determinant::SourceCheckpoint { record_count } => {
                buf.put_u8(TAG_SOURCE_CHECKPOINT);
                buf.put_u64(record_count);
            }
            Determinant::Timestamp(ts) => {
                buf.put_u8(TAG_TIMESTAMP);
                buf.put_u64(ts);
            }
        }
    }

    /// Encode `determinant` into an owned buffer.
    pub fn encode(&self, determinant: &Determinant) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len(determinant));
        self.encode_into(determinant, &mut buf);
        buf.freeze()
    }

    /// Decode one determinant from the front of `buf`.
    ///
    /// `position` is the byte position of `buf`'s first byte within the
    /// enclosing stream, used only for error reporting.
    pub fn decode(&self, buf: &mut impl Buf, position: usize) -> CausalLogResult<Determinant> {
        if buf.remaining() < 1 {
            return Err(CausalLogError::truncated(1));
        }
        let tag = buf.get_u8();
        fn need<B: Buf>(buf: &B, n: usize) -> CausalLogResult<()> {
            if buf.remaining() < n {
                Err(CausalLogError::truncated(n - buf.remaining()))
            } else {
                Ok(())
            }
        }
        match tag {
            TAG_RNG => {
                need(buf, 4)?;
                Ok(Determinant::Rng(buf.get_u32()))
            }
            TAG_TIMER => {
                need(buf, 9)?;
                let timestamp = buf.get_u64();
                let raw = buf.get_u8();
                let callback = TimerCallback::from_u8(raw).ok_or_else(|| {
                    CausalLogError::malformed(format!("unknown timer callback {}", raw))
                })?;
                Ok(Determinant::Timer {
                    timestamp,
                    callback,
                })
            }
            TAG_BUFFER => {
                need(buf, 9)?;
                let sequence = buf.get_u64();
                let kind = buf.get_u8();
                Ok(Determinant::Buffer { sequence, kind })
            }
            TAG_SOURCE_CHECKPOINT => {
                need(buf, 8)?;
                Ok(Determinant::SourceCheckpoint {
                    record_count: buf.get_u64(),
                })
            }
            TAG_TIMESTAMP => {
                need(buf, 8)?;
                Ok(Determinant::Timestamp(buf.get_u64()))
            }
            other => Err(CausalLogError::UnknownDeterminantTag {
                tag: other,
                position,
            }),
        }
    }

    /// Decode a full byte slice into its determinant sequence.
    ///
    /// Used by replay consumers and tests; the slice must contain whole
    /// determinants only.
    pub fn decode_all(&self, bytes: &[u8]) -> CausalLogResult<Vec<Determinant>> {
        let mut buf = bytes;
        let mut out = Vec::new();
        while !buf.is_empty() {
            let position = bytes.len() - buf.len();
            out.push(self.decode(&mut buf, position)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(d: Determinant) {
        let encoder = DeterminantEncoder::new();
        let bytes = encoder.encode(&d);
        assert_eq!(bytes.len(), encoder.encoded_len(&d));
        let mut buf = bytes.clone();
        assert_eq!(encoder.decode(&mut buf, 0).unwrap(), d);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn round_trip_all_variants() {
        round_trip(Determinant::Rng(0));
        round_trip(Determinant::Rng(u32::MAX));
        round_trip(Determinant::timer(1_234_567, TimerCallback::Watermark));
        round_trip(Determinant::timer(0, TimerCallback::Window));
        round_trip(Determinant::Buffer {
            sequence: 99,
            kind: 3,
        });
        round_trip(Determinant::source_checkpoint(1 << 40));
        round_trip(Determinant::Timestamp(1_600_000_000_000));
    }

    #[test]
    fn rng_layout_is_tag_plus_big_endian_int() {
        let bytes = DeterminantEncoder::new().encode(&Determinant::Rng(7));
        assert_eq!(&bytes[..], &[0x01, 0x00, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let encoder = DeterminantEncoder::new();
        let mut buf: &[u8] = &[0x7f, 0, 0, 0, 0];
        let err = encoder.decode(&mut buf, 10).unwrap_err();
        match err {
            CausalLogError::UnknownDeterminantTag { tag, position } => {
                assert_eq!(tag, 0x7f);
                assert_eq!(position, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_payload() {
        let encoder = DeterminantEncoder::new();
        let mut buf: &[u8] = &[TAG_RNG, 0x00];
        assert!(matches!(
            encoder.decode(&mut buf, 0),
            Err(CausalLogError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_all_sequence() {
        let encoder = DeterminantEncoder::new();
        let mut buf = BytesMut::new();
        let determinants = [
            Determinant::Rng(7),
            Determinant::Rng(11),
            Determinant::source_checkpoint(3),
        ];
        for d in &determinants {
            encoder.encode_into(d, &mut buf);
        }
        assert_eq!(encoder.decode_all(&buf).unwrap(), determinants);
    }
}
