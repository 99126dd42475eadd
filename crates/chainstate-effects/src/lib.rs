//! Chain State Effects - Production Handlers
//!
//! Stateless-by-contract implementations of the effect traits from
//! `chainstate-core`:
//!
//! - `MemoryChainStorage`: process-local storage, atomic batch apply
//! - `FileChainStorage`: single-file snapshot store that survives restarts
//! - `TokioTimeHandler`: monotonic clock on `tokio::time`, so paused tokio
//!   time drives commit windows deterministically in tests
//!
//! Fault-injecting handlers belong in `chainstate-testkit`.

#![forbid(unsafe_code)]

pub mod storage;
pub mod time;

pub use storage::{FileChainStorage, MemoryChainStorage};
pub use time::TokioTimeHandler;
