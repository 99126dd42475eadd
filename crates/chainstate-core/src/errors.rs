//! Unified error system for chain state tracking
//!
//! Every failure the pipeline can surface is a `ChainStateError`. Errors are
//! `Clone` so the same value can be returned to a submitter and broadcast to
//! observers.

use std::fmt;

use crate::effects::StorageError;
use crate::types::{BlockHash, OperationKind};

/// Which hash an order check compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashField {
    /// An apply's parent hash against the tip hash
    ParentHash,
    /// A retract's own hash against the tip hash
    Hash,
}

impl fmt::Display for HashField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashField::ParentHash => f.write_str("parent hash"),
            HashField::Hash => f.write_str("hash"),
        }
    }
}

/// Broken chain-order invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderViolation {
    /// Operation height does not follow from the tip
    #[error("Got block with incorrect height. Expected {expected}, but got {actual}")]
    HeightMismatch {
        /// Height the tip requires
        expected: u64,
        /// Height the operation carried
        actual: u64,
    },

    /// Operation does not link to the tip hash
    #[error("Got block with incorrect {field}. Expected \"{expected}\" but got \"{actual}\"")]
    HashMismatch {
        /// Which hash was compared
        field: HashField,
        /// The tip hash
        expected: BlockHash,
        /// The hash the operation carried
        actual: BlockHash,
    },

    /// Retract while no record is applied
    #[error("Got retract of height {actual} but the chain has no tip")]
    NothingToRetract {
        /// Height the operation carried
        actual: u64,
    },

    /// Tip is at the highest representable height
    #[error("Chain tip at height {height} cannot be extended")]
    HeightOverflow {
        /// Height of the tip
        height: u64,
    },
}

/// Unified error type for all chain state operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainStateError {
    /// Malformed operation (caller bug, never retried)
    #[error("Structural error: {message}")]
    Structural {
        /// Description of the malformed input
        message: String,
    },

    /// Operation rejected by the order validator
    #[error(transparent)]
    Order(#[from] OrderViolation),

    /// Handler failed; its open transaction was rolled back
    #[error("{kind} handler failed at height {height}: {message} ({reverted} operation(s) rolled back)")]
    Callback {
        /// Which handler failed
        kind: OperationKind,
        /// Height of the failing operation
        height: u64,
        /// Handler error, flattened
        message: String,
        /// Operations discarded with the transaction, including the failing one
        reverted: usize,
    },

    /// Storage read or commit failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Initialization has not completed
    #[error("Chain state is not ready yet (wait for readiness)")]
    NotReady,

    /// The pipeline has finished or its task is gone
    #[error("Chain state is closed")]
    Closed,

    /// An earlier error stopped the pipeline
    #[error("Chain state halted: {reason}")]
    Halted {
        /// The error that halted the pipeline
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the invalid setting
        message: String,
    },
}

impl ChainStateError {
    /// Create a structural error
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Create a halted error from the error that caused it
    pub fn halted(reason: &ChainStateError) -> Self {
        Self::Halted {
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Standard Result type for chain state operations
pub type Result<T> = std::result::Result<T, ChainStateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_violation_messages() {
        let err = OrderViolation::HeightMismatch {
            expected: 1,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "Got block with incorrect height. Expected 1, but got 5"
        );

        let err = OrderViolation::HashMismatch {
            field: HashField::ParentHash,
            expected: BlockHash::ZERO,
            actual: BlockHash::repeat(1),
        };
        assert!(err.to_string().contains("incorrect parent hash"));
        assert!(err.to_string().contains(&BlockHash::ZERO.to_hex()));
    }

    #[test]
    fn test_error_conversion() {
        let err: ChainStateError = StorageError::CommitFailed("disk full".into()).into();
        assert!(matches!(err, ChainStateError::Storage(_)));
        assert_eq!(err.to_string(), "Storage commit failed: disk full");

        let err: ChainStateError = OrderViolation::HeightOverflow { height: u64::MAX }.into();
        assert!(matches!(
            err,
            ChainStateError::Order(OrderViolation::HeightOverflow { .. })
        ));
        assert!(err.to_string().contains("cannot be extended"));
    }
}
