//! Error types for the causal log.
//!
//! The taxonomy is deliberately small. Encoding failures are fatal to the
//! enclosing task: log integrity cannot be salvaged mid-epoch, so they are
//! propagated up to the caller and never logged-and-swallowed. Capacity
//! failures are surfaced to the producer, which may retry after yielding.
//!
//! Anomalies that are *not* errors (stale deltas, unknown consumers,
//! operations on a closed log) are handled locally and recorded on
//! [`crate::ops::counters::CausalLogMetrics`].

use thiserror::Error;

/// Error conditions surfaced by the causal log core.
#[derive(Debug, Error)]
pub enum CausalLogError {
    /// A determinant tag no decoder recognizes was encountered.
    ///
    /// Fatal to the enclosing task: the byte stream cannot be re-synchronized.
    #[error("unrecognized determinant tag 0x{tag:02x} at byte {position}")]
    UnknownDeterminantTag {
        /// The offending tag byte.
        tag: u8,
        /// Byte position within the decoded stream.
        position: usize,
    },

    /// A wire frame violated the delta layout.
    #[error("malformed frame: {message}")]
    MalformedFrame {
        /// Description of the violation.
        message: String,
    },

    /// Input ended before a complete frame or determinant could be decoded.
    #[error("truncated input: {needed} more bytes required")]
    Truncated {
        /// Minimum number of additional bytes required.
        needed: usize,
    },

    /// The buffer pool refused to hand out another segment.
    ///
    /// Surfaced to the producer, which retries after yielding or fails the
    /// task when retries are exhausted.
    #[error("buffer pool exhausted: {allocated} segments allocated, limit {limit}")]
    PoolExhausted {
        /// Segments currently allocated from the pool.
        allocated: usize,
        /// Configured pool limit.
        limit: usize,
    },

    /// An append was routed to a subpartition the vertex does not produce.
    #[error("unknown subpartition {key}")]
    UnknownPartition {
        /// The partition key that was not found.
        key: crate::core::ids::PartitionKey,
    },
}

impl CausalLogError {
    /// Create a `MalformedFrame` error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Create a `Truncated` error.
    pub fn truncated(needed: usize) -> Self {
        Self::Truncated { needed }
    }

    /// Whether this error belongs to the encoding class.
    ///
    /// Encoding errors are fatal to the enclosing task.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            Self::UnknownDeterminantTag { .. } | Self::MalformedFrame { .. } | Self::Truncated { .. }
        )
    }

    /// Whether the operation may be retried after yielding.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

/// Result type using [`CausalLogError`].
pub type CausalLogResult<T> = Result<T, CausalLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_class() {
        assert!(CausalLogError::UnknownDeterminantTag { tag: 0xff, position: 0 }.is_encoding());
        assert!(CausalLogError::malformed("bad group count").is_encoding());
        assert!(CausalLogError::truncated(4).is_encoding());
        assert!(!CausalLogError::PoolExhausted { allocated: 8, limit: 8 }.is_encoding());
    }

    #[test]
    fn capacity_is_retriable() {
        let err = CausalLogError::PoolExhausted { allocated: 8, limit: 8 };
        assert!(err.is_retriable());
        assert!(!CausalLogError::truncated(1).is_retriable());
    }
}
