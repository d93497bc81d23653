//! Causalog - causal determinant logging core for deterministic replay.
//!
//! Causalog records, per vertex of a distributed streaming job, the
//! non-deterministic choices made during execution (RNG draws, timer
//! firings, source emission counts) so that, on failure, a standby replica
//! can deterministically replay the failed task by consuming those choices
//! from upstream replicas that kept them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Job Causal Log                           │
//! │   local vertex log │ upstream vertex logs │ sharing-depth filter│
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Vertex Causal Logs                        │
//! │     main-thread log │ per-(partition, subpartition) logs        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Thread Causal Logs                        │
//! │  epoch slices │ consumer cursors │ idempotent upstream catch-up │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Segmented Buffer / Buffer Pool                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types
//! - [`core::ids`] - Typed identifiers
//!
//! ## Determinants
//! - [`determinant`] - Determinant taxonomy and its stable byte encoding
//!
//! ## Log layers
//! - [`log::buffer`] - Buffer pool and segmented byte storage
//! - [`log::delta`] - Delta types exchanged between replicas
//! - [`log::thread`] - Single-producer and multi-producer thread logs
//! - [`log::vertex`] - Local and upstream vertex logs
//! - [`log::job`] - Top-level job log and the shared vertex lock
//!
//! ## Wire
//! - [`wire`] - Delta framing and recovery request/response encoding
//!
//! ## Operations
//! - [`ops::counters`] - Observability counters
//!
//! # Key Invariants
//!
//! - **EPOCH-ORDER**: bytes appended within one epoch of one thread log
//!   are totally ordered and immutable once written
//! - **PREFIX-DELIVERY**: the concatenation of deltas delivered to a
//!   consumer within an epoch is a prefix of that epoch's byte sequence
//! - **CATCHUP-CONVERGENCE**: the post-state of an upstream log is
//!   independent of the arrival order of overlapping peer deltas
//! - **RETAIN-COMPLETED**: checkpoint completion reclaims strictly older
//!   epoch slices and retains the just-completed one
//! - **DEPTH-BOUND**: a vertex's determinants travel at most
//!   `causal.sharing_depth` hops downstream

// Core infrastructure
pub mod core;

// Determinant taxonomy and codec
pub mod determinant;

// Log layers
pub mod log;

// Operations and observability
pub mod ops;

// Wire formats
pub mod wire;

// Re-exports for convenience
pub use crate::core::config::{CausalConfig, Config};
pub use crate::core::error::{CausalLogError, CausalLogResult};
pub use crate::core::ids::{ConsumerId, EpochId, PartitionId, PartitionKey, VertexId};
pub use crate::determinant::{Determinant, DeterminantEncoder, TimerCallback};
pub use crate::log::buffer::BufferPool;
pub use crate::log::delta::{ThreadLogDelta, VertexLogDelta};
pub use crate::log::job::{JobCausalLog, VertexGraphInfo, VertexLock, VertexLockGuard};
pub use crate::log::thread::{LocalThreadCausalLog, ThreadCausalLog, UpstreamThreadCausalLog};
pub use crate::log::vertex::{LocalVertexCausalLog, UpstreamVertexCausalLog};
pub use crate::ops::counters::CausalLogMetrics;
pub use crate::wire::{DeterminantRequest, DeterminantResponse};
