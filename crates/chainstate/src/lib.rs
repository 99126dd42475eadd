//! Chain State - Tip Tracking and Transactional Ingestion
//!
//! Keeps a derived key-value store consistent with the tip of an append-only,
//! reorg-capable chain of records. Each record is either applied (extends the
//! chain by one) or retracted (removes the current tip). Every operation is
//! validated against the tracked tip, handed to a caller-supplied
//! [`ChainStateHandler`] inside an open storage transaction, and committed
//! together with the new tip metadata, either immediately or in time-bounded
//! batches.
//!
//! # Example
//!
//! ```ignore
//! use chainstate::{ChainState, ChainStateConfig};
//! use chainstate_effects::MemoryChainStorage;
//!
//! let state = ChainState::spawn(MemoryChainStorage::new(), MyHandler, ChainStateConfig::default())?;
//! state.wait_ready().await?;
//! state.submit(op).await?;
//! state.finish().await?;
//! ```
//!
//! # Modules
//!
//! - `config`: `ChainStateConfig`, TOML/env loading, validation
//! - `validator`: pure chain-order check
//! - `coordinator`: the single in-flight storage transaction
//! - `scheduler`: commit windows and deadline timers
//! - `loader`: start point bootstrap and tip loading
//! - `pipeline`: the per-instance actor task
//! - `state`: the public `ChainState` handle

#![forbid(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod events;
pub mod handler;
pub mod keys;
pub mod loader;
mod pipeline;
pub mod scheduler;
pub mod state;
pub mod validator;

pub use chainstate_core::{
    BlockHash, ChainHead, ChainStateError, ChainStorageEffects, HashField, Namespace, Operation,
    OperationKind, OrderViolation, PhysicalTimeEffects, Result, StartOverride, StartPoint,
    StorageError, StorageTransaction, Tip,
};
pub use config::{ChainStateConfig, ErrorPolicy, StorageLayout};
pub use coordinator::{CommitSummary, RollbackSummary, TransactionCoordinator};
pub use events::{Admission, ChainStateEvent, ChainStateView, Phase};
pub use handler::ChainStateHandler;
pub use loader::{load_initial_state, InitialState};
pub use scheduler::{CommitScheduler, WindowId};
pub use state::{ChainState, ChainStateBuilder};
pub use validator::validate_order;
