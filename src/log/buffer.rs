//! Buffer pool and segmented byte buffer.
//!
//! Thread logs store their bytes in fixed-size segments obtained from a
//! task-scoped [`BufferPool`]. The pool is an accounting layer: it bounds
//! how many segments a task may hold and refuses further segments once the
//! limit is reached, surfacing a capacity error to the producer.
//!
//! [`SegmentedBuffer`] presents the segments as one logical byte sequence
//! addressed by absolute total-bytes-written offsets. Growth appends a
//! segment; nothing is ever relocated, so stored offsets stay valid for the
//! lifetime of the log. Outbound reads copy into an owned, reference-counted
//! `Bytes`, so in-flight network sends survive later reclamation.

use crate::core::config::BufferConfig;
use crate::core::error::{CausalLogError, CausalLogResult};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Default size of one pool segment (32 KiB).
pub const DEFAULT_SEGMENT_SIZE: usize = 32 * 1024;

/// Default maximum number of segments per task.
pub const DEFAULT_MAX_SEGMENTS: usize = 1024;

const ZEROS: [u8; 256] = [0u8; 256];

/// Task-scoped segment pool.
///
/// Owned by the job causal log and destroyed lazily on close so that
/// outstanding segments and outbound delta bytes remain valid.
#[derive(Debug)]
pub struct BufferPool {
    segment_size: usize,
    max_segments: usize,
    allocated: AtomicUsize,
    destroyed: AtomicBool,
}

impl BufferPool {
    /// Create a pool handing out `max_segments` segments of `segment_size`
    /// bytes each.
    pub fn new(segment_size: usize, max_segments: usize) -> Arc<Self> {
        assert!(segment_size > 0, "segment size must be > 0");
        assert!(max_segments > 0, "segment limit must be > 0");
        Arc::new(Self {
            segment_size,
            max_segments,
            allocated: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Create a pool with the default sizing.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(DEFAULT_SEGMENT_SIZE, DEFAULT_MAX_SEGMENTS)
    }

    /// Create a pool from configuration.
    pub fn from_config(config: &BufferConfig) -> Arc<Self> {
        Self::new(config.segment_size, config.max_segments)
    }

    /// Size of one segment in bytes.
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Number of segments currently handed out.
    pub fn allocated_segments(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Whether the pool has been marked destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Mark the pool destroyed.
    ///
    /// No new segments are handed out afterwards; segments already handed
    /// out remain valid until dropped.
    pub fn lazy_destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    fn acquire(self: &Arc<Self>) -> CausalLogResult<Segment> {
        if self.is_destroyed() {
            return Err(CausalLogError::PoolExhausted {
                allocated: self.allocated_segments(),
                limit: 0,
            });
        }
        let prev = self.allocated.fetch_add(1, Ordering::AcqRel);
        if prev >= self.max_segments {
            self.allocated.fetch_sub(1, Ordering::AcqRel);
            return Err(CausalLogError::PoolExhausted {
                allocated: prev,
                limit: self.max_segments,
            });
        }
        Ok(Segment {
            data: BytesMut::with_capacity(self.segment_size),
            base: 0,
            pool: Arc::clone(self),
        })
    }

    fn release_one(&self) {
        self.allocated.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One pool segment plus its absolute position in the owning buffer.
#[derive(Debug)]
struct Segment {
    data: BytesMut,
    base: u64,
    pool: Arc<BufferPool>,
}

impl Segment {
    fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        self.pool.release_one();
    }
}

/// A growable contiguous byte log backed by pool segments.
///
/// Offsets are absolute: the total number of bytes ever written before a
/// position. `head()` is the earliest retained offset, `tip()` the next
/// write position. Reclamation drops whole dead segments from the front.
#[derive(Debug)]
pub struct SegmentedBuffer {
    pool: Arc<BufferPool>,
    segments: VecDeque<Segment>,
    head: u64,
    tip: u64,
}

impl SegmentedBuffer {
    /// Create an empty buffer drawing from `pool`.
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            segments: VecDeque::new(),
            head: 0,
            tip: 0,
        }
    }

    /// Earliest retained absolute offset.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Absolute offset of the next write.
    pub fn tip(&self) -> u64 {
        self.tip
    }

    /// Retained bytes.
    pub fn len(&self) -> usize {
        (self.tip - self.head) as usize
    }

    /// Whether no bytes are retained.
    pub fn is_empty(&self) -> bool {
        self.tip == self.head
    }

    /// Append `bytes` at the tip, acquiring segments as needed.
    ///
    /// All-or-nothing: on a capacity error no bytes are appended and the
    /// tip does not move.
    pub fn append(&mut self, bytes: &[u8]) -> CausalLogResult<()> {
        let mark = self.mark();
        self.append_inner(bytes).map_err(|err| {
            self.restore(mark);
            err
        })
    }

    /// Write `bytes` at absolute `offset`, zero-extending the tip first if
    /// the target range reaches past it.
    ///
    /// All-or-nothing like [`append`](Self::append). The range must not
    /// touch reclaimed bytes.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> CausalLogResult<()> {
        debug_assert!(offset >= self.head, "write into reclaimed range");
        let end = offset + bytes.len() as u64;
        let mark = self.mark();
        while self.tip < end {
            let n = ((end - self.tip) as usize).min(ZEROS.len());
            if let Err(err) = self.append_inner(&ZEROS[..n]) {
                self.restore(mark);
                return Err(err);
            }
        }
        self.overwrite(offset, bytes);
        Ok(())
    }

    fn append_inner(&mut self, mut bytes: &[u8]) -> CausalLogResult<()> {
        let segment_size = self.pool.segment_size();
        while !bytes.is_empty() {
            let needs_new = match self.segments.back() {
                None => true,
                Some(segment) => segment.data.len() >= segment_size,
            };
            if needs_new {
                let mut segment = self.pool.acquire()?;
                segment.base = self.tip;
                self.segments.push_back(segment);
            }
            let segment = self
                .segments
                .back_mut()
                .expect("segment present after acquire");
            let room = segment_size - segment.data.len();
            let n = room.min(bytes.len());
            segment.data.extend_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            self.tip += n as u64;
        }
        Ok(())
    }

    fn mark(&self) -> (u64, usize, Option<usize>) {
        (
            self.tip,
            self.segments.len(),
            self.segments.back().map(|s| s.data.len()),
        )
    }

    fn restore(&mut self, (tip, count, back_len): (u64, usize, Option<usize>)) {
        self.segments.truncate(count);
        if let (Some(len), Some(back)) = (back_len, self.segments.back_mut()) {
            back.data.truncate(len);
        }
        self.tip = tip;
    }

    fn overwrite(&mut self, offset: u64, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() as u64 <= self.tip);
        let mut remaining = bytes;
        let mut pos = offset;
        for segment in self.segments.iter_mut() {
            if remaining.is_empty() {
                break;
            }
            if segment.end() <= pos {
                continue;
            }
            let within = (pos - segment.base) as usize;
            let n = remaining.len().min(segment.data.len() - within);
            segment.data[within..within + n].copy_from_slice(&remaining[..n]);
            remaining = &remaining[n..];
            pos += n as u64;
        }
        debug_assert!(remaining.is_empty(), "overwrite ran past materialized bytes");
    }

    /// Copy the logical range `[start, end)` into an owned buffer.
    ///
    /// The range must lie within `[head, tip]`.
    pub fn copy_range(&self, start: u64, end: u64) -> Bytes {
        debug_assert!(start >= self.head && end <= self.tip && start <= end);
        let mut out = BytesMut::with_capacity((end - start) as usize);
        let mut pos = start;
        for segment in &self.segments {
            if pos >= end {
                break;
            }
            if segment.end() <= pos {
                continue;
            }
            let within = (pos - segment.base) as usize;
            let n = ((end - pos) as usize).min(segment.data.len() - within);
            out.extend_from_slice(&segment.data[within..within + n]);
            pos += n as u64;
        }
        out.freeze()
    }

    /// Advance the head to `offset`, dropping segments that hold no
    /// retained bytes.
    pub fn reclaim_before(&mut self, offset: u64) {
        let offset = offset.min(self.tip);
        if offset <= self.head {
            return;
        }
        while let Some(front) = self.segments.front() {
            if front.end() <= offset {
                self.segments.pop_front();
            } else {
                break;
            }
        }
        self.head = offset;
    }

    /// Release every segment back to the pool.
    pub fn release_all(&mut self) {
        self.segments.clear();
        self.head = self.tip;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_pool() -> Arc<BufferPool> {
        BufferPool::new(8, 16)
    }

    #[test]
    fn append_spans_segments() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool.clone());
        buf.append(b"abcdefghij").unwrap();
        assert_eq!(buf.tip(), 10);
        assert_eq!(pool.allocated_segments(), 2);
        assert_eq!(&buf.copy_range(0, 10)[..], b"abcdefghij");
        assert_eq!(&buf.copy_range(6, 10)[..], b"ghij");
    }

    #[test]
    fn copy_range_across_boundary() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool);
        buf.append(b"0123456789abcdef").unwrap();
        assert_eq!(&buf.copy_range(6, 12)[..], b"6789ab");
    }

    #[test]
    fn write_at_overwrites_and_extends() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool);
        buf.append(b"abcd").unwrap();
        buf.write_at(2, b"XYZP").unwrap();
        assert_eq!(buf.tip(), 6);
        assert_eq!(&buf.copy_range(0, 6)[..], b"abXYZP");
    }

    #[test]
    fn write_at_gap_zero_fills() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool);
        buf.write_at(4, b"zz").unwrap();
        assert_eq!(buf.tip(), 6);
        assert_eq!(&buf.copy_range(0, 6)[..], &[0, 0, 0, 0, b'z', b'z']);
    }

    #[test]
    fn reclaim_drops_dead_segments() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool.clone());
        buf.append(&[7u8; 20]).unwrap();
        assert_eq!(pool.allocated_segments(), 3);
        buf.reclaim_before(9);
        assert_eq!(pool.allocated_segments(), 2);
        assert_eq!(buf.head(), 9);
        assert_eq!(buf.len(), 11);
        // head may sit mid-segment
        assert_eq!(&buf.copy_range(9, 12)[..], &[7u8; 3]);
    }

    #[test]
    fn reclaim_is_monotone() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool);
        buf.append(&[1u8; 12]).unwrap();
        buf.reclaim_before(10);
        buf.reclaim_before(4);
        assert_eq!(buf.head(), 10);
    }

    #[test]
    fn pool_limit_surfaces_capacity_error() {
        let pool = BufferPool::new(8, 2);
        let mut buf = SegmentedBuffer::new(pool);
        buf.append(&[0u8; 16]).unwrap();
        let err = buf.append(b"x").unwrap_err();
        assert!(matches!(err, CausalLogError::PoolExhausted { limit: 2, .. }));
    }

    #[test]
    fn release_returns_accounting() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool.clone());
        buf.append(&[0u8; 24]).unwrap();
        assert_eq!(pool.allocated_segments(), 3);
        buf.release_all();
        assert_eq!(pool.allocated_segments(), 0);
    }

    #[test]
    fn destroyed_pool_refuses_segments() {
        let pool = tiny_pool();
        let mut buf = SegmentedBuffer::new(pool.clone());
        buf.append(b"abc").unwrap();
        pool.lazy_destroy();
        assert!(buf.append(&[0u8; 8]).is_err());
        // existing bytes stay readable
        assert_eq!(&buf.copy_range(0, 3)[..], b"abc");
    }
}
