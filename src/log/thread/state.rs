//! Epoch-sliced log state.
//!
//! A thread log is a byte sequence sliced by epoch id. Each slice remembers
//! the absolute buffer offset at which its epoch begins; slices are
//! adjacent, so a slice ends where the next one starts (the latest slice
//! ends at the buffer tip). A slice is open while it is the latest, closed
//! once a later epoch opens, and reclaimed when a checkpoint with a greater
//! id completes. Transitions are monotone; no slice re-opens.
//!
//! Upstream catch-up may momentarily leave holes inside the latest slice
//! when concurrent peers race; each slice therefore tracks its filled
//! ranges, and only the contiguous filled prefix is ever served to
//! consumers.

use crate::core::error::CausalLogResult;
use crate::core::ids::EpochId;
use crate::log::buffer::{BufferPool, SegmentedBuffer};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

/// Byte ranges of an epoch that hold real data.
///
/// Kept sorted and coalesced. Almost always a single `[0, n)` range; holes
/// only appear transiently under racing upstream producers.
#[derive(Debug, Default)]
pub(crate) struct RangeSet {
    ranges: Vec<(u64, u64)>,
}

impl RangeSet {
    /// Insert `[start, end)`, merging with adjacent or overlapping ranges.
    pub fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        let mut new = (start, end);
        let mut placed = false;
        for &(s, e) in &self.ranges {
            if e < new.0 {
                merged.push((s, e));
            } else if s > new.1 {
                if !placed {
                    merged.push(new);
                    placed = true;
                }
                merged.push((s, e));
            } else {
                new = (new.0.min(s), new.1.max(e));
            }
        }
        if !placed {
            merged.push(new);
        }
        self.ranges = merged;
    }

    /// Length of the contiguous filled prefix starting at offset 0.
    pub fn prefix_len(&self) -> u64 {
        match self.ranges.first() {
            Some(&(0, end)) => end,
            _ => 0,
        }
    }

    /// One past the highest filled offset.
    pub fn max_end(&self) -> u64 {
        self.ranges.last().map_or(0, |&(_, end)| end)
    }

    /// Whether `[start, end)` is fully filled.
    pub fn covers(&self, start: u64, end: u64) -> bool {
        if start >= end {
            return true;
        }
        self.ranges.iter().any(|&(s, e)| s <= start && end <= e)
    }

    /// Total filled bytes within `[start, end)`.
    pub fn covered_len(&self, start: u64, end: u64) -> u64 {
        self.ranges
            .iter()
            .map(|&(s, e)| e.min(end).saturating_sub(s.max(start)))
            .sum()
    }
}

/// One epoch slice: where the epoch starts in the buffer and which of its
/// bytes have arrived.
#[derive(Debug)]
pub(crate) struct EpochSlice {
    /// Absolute buffer offset of the epoch's first byte.
    pub start: u64,

    /// Epoch-relative ranges that hold real data.
    pub filled: RangeSet,
}

impl EpochSlice {
    fn new(start: u64) -> Self {
        Self {
            start,
            filled: RangeSet::default(),
        }
    }
}

/// Outcome of applying an upstream catch-up delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CatchUpOutcome {
    /// New bytes were written.
    Applied {
        /// Bytes not previously present.
        new_bytes: u64,
    },
    /// Every byte of the delta was already present.
    Stale,
    /// The delta claimed bytes outside a closed epoch region, or named an
    /// epoch that is already reclaimed.
    Rejected,
}

/// The slice table over the backing buffer.
///
/// Callers synchronize access; this type holds no locks of its own.
#[derive(Debug)]
pub(crate) struct LogState {
    pub buffer: SegmentedBuffer,
    slices: BTreeMap<EpochId, EpochSlice>,
    reclaim_floor: Option<EpochId>,
    pub closed: bool,
}

impl LogState {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            buffer: SegmentedBuffer::new(pool),
            slices: BTreeMap::new(),
            reclaim_floor: None,
            closed: false,
        }
    }

    /// Whether `epoch` was reclaimed by a completed checkpoint.
    pub fn is_reclaimed(&self, epoch: EpochId) -> bool {
        self.reclaim_floor.is_some_and(|floor| epoch < floor)
    }

    /// Earliest retained epoch, if any slice remains.
    pub fn earliest_epoch(&self) -> Option<EpochId> {
        self.slices.keys().next().copied()
    }

    /// Latest opened epoch, if any slice remains.
    pub fn latest_epoch(&self) -> Option<EpochId> {
        self.slices.keys().next_back().copied()
    }

    /// Earliest retained epoch at or after `epoch`.
    pub fn earliest_at_or_after(&self, epoch: EpochId) -> Option<EpochId> {
        self.slices.range(epoch..).next().map(|(&id, _)| id)
    }

    /// Start offset and servable length of `epoch`, if retained.
    ///
    /// The servable length is the contiguous filled prefix; bytes past a
    /// hole are withheld until the hole fills.
    pub fn slice_view(&self, epoch: EpochId) -> Option<(u64, u64)> {
        self.slices
            .get(&epoch)
            .map(|slice| (slice.start, slice.filled.prefix_len()))
    }

    /// Append producer bytes to `epoch`, opening its slice at the tip on
    /// the first write.
    ///
    /// The producer drives epoch ids monotonically; a slice for an epoch
    /// older than the latest must already exist.
    pub fn append_to_epoch(&mut self, epoch: EpochId, bytes: &[u8]) -> CausalLogResult<()> {
        debug_assert!(
            self.latest_epoch().is_none_or(|latest| epoch >= latest),
            "producer epochs must be monotone"
        );
        let tip = self.buffer.tip();
        let slice = self.slices.entry(epoch).or_insert_with(|| EpochSlice::new(tip));
        let rel = tip - slice.start;
        debug_assert_eq!(rel, slice.filled.max_end(), "local slices have no holes");
        self.buffer.append(bytes)?;
        slice.filled.insert(rel, rel + bytes.len() as u64);
        Ok(())
    }

    /// Apply an idempotent upstream catch-up delta to `epoch`.
    ///
    /// The slice is created lazily, pinned at the current tip, on the first
    /// delta that mentions the epoch. Bytes the log already holds are
    /// discarded; genuinely new bytes are written at their positional
    /// offset, zero-extending the latest slice when peers race ahead.
    pub fn apply_catch_up(
        &mut self,
        epoch: EpochId,
        offset_from_epoch: u64,
        payload: &[u8],
    ) -> CausalLogResult<CatchUpOutcome> {
        if payload.is_empty() {
            return Ok(CatchUpOutcome::Stale);
        }
        if self.is_reclaimed(epoch) {
            // the receiver has advanced past this epoch
            return Ok(CatchUpOutcome::Stale);
        }
        let latest = self.latest_epoch();
        if !self.slices.contains_key(&epoch) {
            // a never-opened epoch older than the latest has no region to
            // land in
            if latest.is_some_and(|l| epoch < l) {
                return Ok(CatchUpOutcome::Rejected);
            }
            let tip = self.buffer.tip();
            self.slices.insert(epoch, EpochSlice::new(tip));
        }

        let end = offset_from_epoch + payload.len() as u64;
        let region_limit = self.region_limit(epoch);
        let slice = self
            .slices
            .get_mut(&epoch)
            .expect("slice present after insert");

        if slice.filled.covers(offset_from_epoch, end) {
            return Ok(CatchUpOutcome::Stale);
        }
        if let Some(limit) = region_limit {
            if end > limit {
                return Ok(CatchUpOutcome::Rejected);
            }
        }

        let previously_filled = slice.filled.covered_len(offset_from_epoch, end);
        let start_abs = slice.start + offset_from_epoch;
        self.buffer.write_at(start_abs, payload)?;
        let slice = self
            .slices
            .get_mut(&epoch)
            .expect("slice survives the write");
        slice.filled.insert(offset_from_epoch, end);
        let new_bytes = (payload.len() as u64).saturating_sub(previously_filled);
        Ok(CatchUpOutcome::Applied { new_bytes })
    }

    /// Length a closed epoch's region may grow to, or `None` for the
    /// latest (open) epoch.
    fn region_limit(&self, epoch: EpochId) -> Option<u64> {
        let start = self.slices.get(&epoch).map(|s| s.start)?;
        self.slices
            .range((Excluded(epoch), Unbounded))
            .next()
            .map(|(_, next)| next.start - start)
    }

    /// Copy the servable bytes of `epoch` in `[from, to)` (epoch-relative).
    pub fn copy_epoch_range(&self, epoch: EpochId, from: u64, to: u64) -> Option<Bytes> {
        let (start, _) = self.slice_view(epoch)?;
        Some(self.buffer.copy_range(start + from, start + to))
    }

    /// Reclaim every slice with an id strictly below `checkpoint`.
    ///
    /// The slice with id equal to `checkpoint` is retained: it anchors
    /// cursors that have not advanced past it yet. Repeated or stale
    /// notifications are no-ops. Returns the number of reclaimed slices.
    pub fn reclaim_before(&mut self, checkpoint: EpochId) -> usize {
        let kept = self.slices.split_off(&checkpoint);
        let reclaimed = self.slices.len();
        self.slices = kept;
        if self.reclaim_floor.is_none_or(|floor| checkpoint > floor) {
            self.reclaim_floor = Some(checkpoint);
        }
        let new_head = self
            .slices
            .values()
            .next()
            .map_or(self.buffer.tip(), |slice| slice.start);
        self.buffer.reclaim_before(new_head);
        reclaimed
    }

    /// Absolute end of the servable byte sequence.
    pub fn servable_end(&self) -> u64 {
        match self.slices.values().next_back() {
            Some(slice) => slice.start + slice.filled.prefix_len(),
            None => self.buffer.tip(),
        }
    }
}
