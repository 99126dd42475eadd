//! Chain State Core - Types and Effect Interfaces
//!
//! This crate provides the foundational types and effect interfaces shared by
//! every chain state crate. It contains no runtime, no storage engine and no
//! ingestion logic.
//!
//! # Contents
//!
//! - `types`: `BlockHash`, `Tip`, `ChainHead`, `StartPoint`, `Operation`
//! - `errors`: `OrderViolation` and the unified `ChainStateError`
//! - `effects`: `ChainStorageEffects` (transactional key-value storage) and
//!   `PhysicalTimeEffects` (monotonic clock + sleep)
//!
//! # Layering
//!
//! - `chainstate-core` (this crate): pure types and trait signatures
//! - `chainstate-effects`: production handlers for the effect traits
//! - `chainstate`: the ingestion pipeline built on top of the effects
//! - `chainstate-testkit`: fault-injecting handlers and fixtures

#![forbid(unsafe_code)]

/// Effect interfaces (no implementations)
pub mod effects;

/// Unified error handling
pub mod errors;

/// Hashes, tips, start points and operations
pub mod types;

pub use effects::{
    BatchOp, ChainStorageEffects, Namespace, PhysicalTimeEffects, StorageError,
    StorageTransaction, WriteBatch,
};
pub use errors::{ChainStateError, HashField, OrderViolation, Result};
pub use types::{
    BlockHash, ChainHead, Operation, OperationKind, StartOverride, StartPoint, Tip, HASH_LEN,
};
