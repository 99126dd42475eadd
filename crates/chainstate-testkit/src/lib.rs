//! Chain State Testing Infrastructure
//!
//! Shared fixtures for chain state tests: fault-injecting storage, a handler
//! that records what it was asked to do, operation builders and proptest
//! strategies.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! chainstate-testkit = { path = "../chainstate-testkit" }
//! ```
//!
//! ```rust,ignore
//! use chainstate_testkit::*;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     init_test_tracing();
//!     let storage = FaultyStorage::new();
//!     let handler = RecordingHandler::new();
//!     // ... spawn a ChainState and submit chain(0, 10)
//! }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod builders;
pub mod handler;
pub mod storage;
pub mod strategies;

pub use builders::*;
pub use handler::{HandlerCall, RecordingHandler, BLOCK_KEY_PREFIX};
pub use storage::FaultyStorage;

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`. Later calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(false)
        .try_init();
}
