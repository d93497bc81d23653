//! Thread causal logs.
//!
//! A thread causal log backs a single logical producer: either this
//! replica's own thread ([`LocalThreadCausalLog`], appends serialized by
//! the external vertex lock) or a remote peer whose deltas arrive
//! concurrently from the network ([`UpstreamThreadCausalLog`]).
//!
//! Both flavors share the same read contract: per-consumer cursors advance
//! monotonically through epoch slices, and the bytes delivered across
//! successive calls for one consumer are the strict continuation of the
//! bytes delivered before. The buffer sits behind a read-write lock so
//! delta readers never block each other; each cursor has its own mutex so
//! two consumers never contend.

mod local;
mod state;
mod upstream;

pub use local::LocalThreadCausalLog;
pub use upstream::UpstreamThreadCausalLog;

use crate::core::ids::{ConsumerId, EpochId};
use crate::log::buffer::BufferPool;
use crate::log::delta::ThreadLogDelta;
use crate::ops::counters::CausalLogMetrics;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use state::LogState;
use std::sync::Arc;

pub(crate) use state::CatchUpOutcome;

/// Read and lifecycle contract shared by both thread log flavors.
pub trait ThreadCausalLog {
    /// Return the bytes between `consumer`'s cursor and the current writer
    /// position within `epoch`, advancing the cursor past them.
    ///
    /// An unknown consumer has its cursor lazily created at the start of
    /// `epoch`. An epoch older than any retained slice yields an empty
    /// delta.
    fn next_determinants_for_downstream(
        &self,
        consumer: ConsumerId,
        epoch: EpochId,
    ) -> ThreadLogDelta;

    /// All retained bytes from `start_epoch` (or the earliest retained
    /// epoch after it) up to the tip, without touching any cursor.
    ///
    /// Returns `None` when nothing is retained in that range.
    fn determinants_from(&self, start_epoch: EpochId) -> Option<ThreadLogDelta>;

    /// Reclaim every epoch slice with an id below `checkpoint`.
    fn notify_checkpoint_complete(&self, checkpoint: EpochId);

    /// Reset `consumer`'s cursor to the earliest retained epoch so a
    /// replacement replica is replayed from the oldest in-scope
    /// determinant.
    fn notify_downstream_failure(&self, consumer: ConsumerId);

    /// Drop `consumer`'s cursor.
    fn unregister_consumer(&self, consumer: ConsumerId);

    /// Total live bytes.
    fn log_length(&self) -> usize;

    /// Release all backing storage. Idempotent; later operations observe an
    /// empty log.
    fn close(&self);
}

/// A consumer's read position: the epoch it is consuming and its logical
/// offset within that epoch.
#[derive(Debug, Clone, Copy)]
struct ConsumerCursor {
    epoch: EpochId,
    offset: u64,
}

impl ConsumerCursor {
    fn at_start_of(epoch: EpochId) -> Self {
        Self { epoch, offset: 0 }
    }
}

/// State shared by both thread log flavors.
///
/// The slice table and buffer live behind one `RwLock`; writers (producer
/// appends, upstream catch-up, reclamation) take the write side, delta
/// readers the read side. Cursors live outside the lock in a concurrent
/// map, each behind its own mutex, which also serializes delivery per
/// consumer.
pub(crate) struct ThreadLogCore {
    state: RwLock<LogState>,
    cursors: DashMap<ConsumerId, Arc<Mutex<ConsumerCursor>>>,
    metrics: Arc<CausalLogMetrics>,
}

impl ThreadLogCore {
    pub fn new(pool: Arc<BufferPool>, metrics: Arc<CausalLogMetrics>) -> Self {
        Self {
            state: RwLock::new(LogState::new(pool)),
            cursors: DashMap::new(),
            metrics,
        }
    }

    fn cursor_cell(&self, consumer: ConsumerId, epoch: EpochId) -> Arc<Mutex<ConsumerCursor>> {
        self.cursors
            .entry(consumer)
            .or_insert_with(|| {
                self.metrics.inc_cursors_lazily_created();
                Arc::new(Mutex::new(ConsumerCursor::at_start_of(epoch)))
            })
            .clone()
    }

    pub fn next_delta(&self, consumer: ConsumerId, epoch: EpochId) -> ThreadLogDelta {
        let cell = self.cursor_cell(consumer, epoch);
        let mut cursor = cell.lock();

        let state = self.state.read();
        if state.closed {
            return ThreadLogDelta::empty(epoch);
        }
        if cursor.epoch > epoch {
            // the consumer already advanced past this epoch
            return ThreadLogDelta::empty(epoch);
        }
        if cursor.epoch < epoch {
            // the caller drives epoch advance through successive calls; the
            // tail of the previous epoch was emitted by those calls
            *cursor = ConsumerCursor::at_start_of(epoch);
        }
        let Some((_, servable)) = state.slice_view(epoch) else {
            return ThreadLogDelta::empty(epoch);
        };
        debug_assert!(cursor.offset <= servable);
        if cursor.offset >= servable {
            return ThreadLogDelta::empty(epoch);
        }
        let bytes = state
            .copy_epoch_range(epoch, cursor.offset, servable)
            .unwrap_or_default();
        let delta = ThreadLogDelta::new(epoch, cursor.offset, bytes);
        cursor.offset = servable;
        self.metrics.inc_deltas_dispatched();
        delta
    }

    pub fn determinants_from(&self, start_epoch: EpochId) -> Option<ThreadLogDelta> {
        let state = self.state.read();
        if state.closed {
            return None;
        }
        let epoch = state.earliest_at_or_after(start_epoch)?;
        let (start, _) = state.slice_view(epoch)?;
        let end = state.servable_end();
        if end <= start {
            return None;
        }
        let bytes = state.buffer.copy_range(start, end);
        Some(ThreadLogDelta::new(epoch, 0, bytes))
    }

    pub fn notify_checkpoint_complete(&self, checkpoint: EpochId) {
        let earliest = {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            let reclaimed = state.reclaim_before(checkpoint);
            if reclaimed > 0 {
                self.metrics.add_epochs_reclaimed(reclaimed as u64);
            }
            state.earliest_epoch()
        };
        // rebase cursors stranded in reclaimed slices; the state lock is
        // released so in-flight readers are not held up
        if let Some(earliest) = earliest {
            for entry in self.cursors.iter() {
                let mut cursor = entry.value().lock();
                if cursor.epoch < earliest {
                    *cursor = ConsumerCursor::at_start_of(earliest);
                }
            }
        }
    }

    pub fn notify_downstream_failure(&self, consumer: ConsumerId) {
        let earliest = self.state.read().earliest_epoch();
        match earliest {
            Some(epoch) => {
                let cell = self.cursor_cell(consumer, epoch);
                *cell.lock() = ConsumerCursor::at_start_of(epoch);
            }
            None => {
                // nothing retained; the next read re-creates the cursor
                self.cursors.remove(&consumer);
            }
        }
    }

    pub fn unregister_consumer(&self, consumer: ConsumerId) {
        self.cursors.remove(&consumer);
    }

    pub fn log_length(&self) -> usize {
        self.state.read().buffer.len()
    }

    pub fn close(&self) {
        let mut state = self.state.write();
        state.closed = true;
        state.buffer.release_all();
        drop(state);
        self.cursors.clear();
    }

    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut LogState) -> R) -> R {
        f(&mut self.state.write())
    }

    pub fn metrics(&self) -> &CausalLogMetrics {
        &self.metrics
    }
}
