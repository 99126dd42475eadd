//! Caller-supplied derived-store logic
//!
//! The pipeline calls exactly one of these per admitted operation, inside the
//! open storage transaction. The transaction is borrowed mutably for the call,
//! so it is the only write channel the handler has and the handler cannot
//! commit or roll it back. Returning an error rolls back the whole
//! transaction, including writes from earlier operations in the same commit
//! window.

use async_trait::async_trait;
use chainstate_core::{Operation, OperationKind, StorageTransaction};
use std::sync::Arc;

/// Derived-store logic invoked once per admitted operation.
#[async_trait]
pub trait ChainStateHandler<P>: Send + Sync {
    /// Apply the record extending the chain.
    async fn apply(&self, op: &Operation<P>, tx: &mut StorageTransaction) -> anyhow::Result<()>;

    /// Undo the record currently at the tip.
    async fn retract(&self, op: &Operation<P>, tx: &mut StorageTransaction)
        -> anyhow::Result<()>;
}

/// Blanket implementation for Arc<T> where T: ChainStateHandler
#[async_trait]
impl<P, T> ChainStateHandler<P> for Arc<T>
where
    P: Send + Sync,
    T: ChainStateHandler<P> + ?Sized,
{
    async fn apply(&self, op: &Operation<P>, tx: &mut StorageTransaction) -> anyhow::Result<()> {
        (**self).apply(op, tx).await
    }

    async fn retract(
        &self,
        op: &Operation<P>,
        tx: &mut StorageTransaction,
    ) -> anyhow::Result<()> {
        (**self).retract(op, tx).await
    }
}

/// Route `op` to the handler method for `kind`.
pub(crate) async fn dispatch<P>(
    handler: &dyn ChainStateHandler<P>,
    kind: OperationKind,
    op: &Operation<P>,
    tx: &mut StorageTransaction,
) -> anyhow::Result<()>
where
    P: Send + Sync,
{
    match kind {
        OperationKind::Apply => handler.apply(op, tx).await,
        OperationKind::Retract => handler.retract(op, tx).await,
    }
}
