//! Determinants: byte-encoded records of non-deterministic events.
//!
//! A determinant captures a single non-deterministic choice made by a
//! producer thread (an RNG draw, a timer firing, a source emission count)
//! with enough information to replay the choice on a standby replica.
//! Determinants are appended to the causal log under the vertex lock and
//! never mutated afterwards.
//!
//! The encoding is a 1-byte tag followed by a fixed big-endian payload and
//! MUST be round-trip stable across all replicas of the same job; see
//! [`DeterminantEncoder`].

mod codec;

pub use codec::DeterminantEncoder;

/// The processing-time callback that a timer determinant replays into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerCallback {
    /// Periodic watermark emission.
    Watermark,
    /// Latency-marker emission.
    Latency,
    /// Window trigger firing.
    Window,
}

impl TimerCallback {
    /// Wire byte for this callback.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Watermark => 0,
            Self::Latency => 1,
            Self::Window => 2,
        }
    }

    /// Reconstruct a callback from its wire byte.
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Watermark),
            1 => Some(Self::Latency),
            2 => Some(Self::Window),
            _ => None,
        }
    }
}

/// A single logged non-deterministic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Determinant {
    /// An RNG draw observed by user or framework code.
    Rng(u32),

    /// A processing-time timer firing at `timestamp`, routed to `callback`.
    Timer {
        /// Firing timestamp in milliseconds.
        timestamp: u64,
        /// Callback the firing is replayed into.
        callback: TimerCallback,
    },

    /// A network buffer build decision.
    Buffer {
        /// Sequence number of the buffer within its subpartition.
        sequence: u64,
        /// Producer-defined buffer kind.
        kind: u8,
    },

    /// Number of records a source emitted before a checkpoint barrier.
    SourceCheckpoint {
        /// Records emitted within the closing epoch.
        record_count: u64,
    },

    /// A wall-clock timestamp draw.
    Timestamp(u64),
}

impl Determinant {
    /// Create an RNG determinant.
    pub const fn rng(value: u32) -> Self {
        Self::Rng(value)
    }

    /// Create a timer determinant.
    pub const fn timer(timestamp: u64, callback: TimerCallback) -> Self {
        Self::Timer {
            timestamp,
            callback,
        }
    }

    /// Create a source checkpoint determinant.
    pub const fn source_checkpoint(record_count: u64) -> Self {
        Self::SourceCheckpoint { record_count }
    }

    /// Short name of the variant, for diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rng(_) => "rng",
            Self::Timer { .. } => "timer",
            Self::Buffer { .. } => "buffer",
            Self::SourceCheckpoint { .. } => "source_checkpoint",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

impl std::fmt::Display for Determinant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rng(v) => write!(f, "rng({})", v),
            Self::Timer {
                timestamp,
                callback,
            } => write!(f, "timer({}ms, {:?})", timestamp, callback),
            Self::Buffer { sequence, kind } => write!(f, "buffer(#{}, kind {})", sequence, kind),
            Self::SourceCheckpoint { record_count } => {
                write!(f, "source_checkpoint({} records)", record_count)
            }
            Self::Timestamp(ts) => write!(f, "timestamp({}ms)", ts),
        }
    }
}
