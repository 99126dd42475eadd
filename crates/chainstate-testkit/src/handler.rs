//! Recording chain state handler
//!
//! Writes one key per applied height into the data namespace and deletes it on
//! retract, so after any run the data namespace mirrors the durable chain.
//! Every call is recorded, and individual heights can be made to fail.

use async_trait::async_trait;
use chainstate::ChainStateHandler;
use chainstate_core::{Operation, OperationKind, StorageTransaction};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Prefix of the per-height keys the handler writes.
pub const BLOCK_KEY_PREFIX: &str = "block/";

/// One handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerCall {
    /// Which method ran
    pub kind: OperationKind,
    /// Height of the operation
    pub height: u64,
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<HandlerCall>,
    fail_heights: BTreeSet<u64>,
    delay: Option<Duration>,
}

/// Handler that mirrors the chain into `block/<height>` keys
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    state: Arc<Mutex<Recorder>>,
}

impl RecordingHandler {
    /// Create a handler that always succeeds immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Data key written for `height`
    pub fn block_key(height: u64) -> String {
        format!("{BLOCK_KEY_PREFIX}{height:010}")
    }

    /// Fail any operation at `height`
    pub fn fail_at(&self, height: u64) {
        self.state.lock().fail_heights.insert(height);
    }

    /// Stop failing at every height
    pub fn clear_failures(&self) {
        self.state.lock().fail_heights.clear();
    }

    /// Sleep for `delay` inside every call
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<HandlerCall> {
        self.state.lock().calls.clone()
    }

    async fn record<P>(&self, kind: OperationKind, op: &Operation<P>) -> anyhow::Result<()> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(HandlerCall {
                kind,
                height: op.height,
            });
            if state.fail_heights.contains(&op.height) {
                anyhow::bail!("injected {kind} failure at height {}", op.height);
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl<P> ChainStateHandler<P> for RecordingHandler
where
    P: Send + Sync,
{
    async fn apply(&self, op: &Operation<P>, tx: &mut StorageTransaction) -> anyhow::Result<()> {
        self.record(OperationKind::Apply, op).await?;
        tx.put(Self::block_key(op.height), op.hash.to_hex().into_bytes());
        Ok(())
    }

    async fn retract(&self, op: &Operation<P>, tx: &mut StorageTransaction) -> anyhow::Result<()> {
        self.record(OperationKind::Retract, op).await?;
        tx.delete(Self::block_key(op.height));
        Ok(())
    }
}
