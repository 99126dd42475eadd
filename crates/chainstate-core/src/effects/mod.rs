//! Pure effect interfaces
//!
//! Handlers live in `chainstate-effects` (production) and
//! `chainstate-testkit` (fault injection).

pub mod storage;
pub mod time;

pub use storage::{
    BatchOp, ChainStorageEffects, Namespace, StorageError, StorageTransaction, WriteBatch,
};
pub use time::PhysicalTimeEffects;
