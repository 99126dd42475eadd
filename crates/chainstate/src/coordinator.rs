//! Transaction coordination
//!
//! Owns the single in-flight storage transaction. It moves `Idle → Open` when
//! the first operation of a window arrives and back to `Idle` on commit or
//! rollback. Operations are folded into the open transaction in arrival
//! order. The coordinator also remembers the last durable head, which is what
//! the in-memory head falls back to when an open transaction is discarded.

use chainstate_core::{ChainHead, ChainStorageEffects, StorageError, StorageTransaction, Tip};

use crate::config::StorageLayout;
use crate::keys;

/// Open transaction plus what has been folded into it.
#[derive(Debug)]
pub struct PendingTransaction {
    tx: StorageTransaction,
    operations: usize,
    staged_head: Option<ChainHead>,
}

impl PendingTransaction {
    /// Operations folded into this transaction.
    pub fn operations(&self) -> usize {
        self.operations
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    /// Head now durable
    pub head: ChainHead,
    /// Operations the commit made durable
    pub operations: usize,
}

/// Result of a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackSummary {
    /// Operations whose writes were discarded
    pub operations: usize,
    /// Head the in-memory state must revert to
    pub restore: ChainHead,
}

/// Commit/rollback lifecycle of the pending transaction.
#[derive(Debug)]
pub struct TransactionCoordinator {
    layout: StorageLayout,
    pending: Option<PendingTransaction>,
    durable: ChainHead,
}

impl TransactionCoordinator {
    /// Create an idle coordinator whose durable head is `durable`.
    pub fn new(layout: StorageLayout, durable: ChainHead) -> Self {
        Self {
            layout,
            pending: None,
            durable,
        }
    }

    /// Whether a transaction is open.
    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }

    /// Operations folded into the open transaction (0 when idle).
    pub fn pending_operations(&self) -> usize {
        self.pending.as_ref().map_or(0, PendingTransaction::operations)
    }

    /// Last committed head.
    pub fn durable_head(&self) -> ChainHead {
        self.durable
    }

    /// Last committed tip.
    pub fn durable_tip(&self) -> Option<Tip> {
        self.durable.tip()
    }

    /// Open a transaction against the data namespace unless one is open.
    /// Returns `true` when a new transaction was opened.
    pub fn ensure_open(&mut self, storage: &dyn ChainStorageEffects) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(PendingTransaction {
            tx: storage.begin_transaction(&self.layout.data),
            operations: 0,
            staged_head: None,
        });
        true
    }

    /// The open transaction, for handler writes.
    pub fn transaction_mut(&mut self) -> Option<&mut StorageTransaction> {
        self.pending.as_mut().map(|pending| &mut pending.tx)
    }

    /// Record a successful operation: stage its resulting head into the open
    /// transaction, replacing whatever an earlier operation staged.
    pub fn stage_head(&mut self, head: ChainHead) {
        if let Some(pending) = self.pending.as_mut() {
            keys::stage_head(&mut pending.tx, &self.layout.state, &head);
            pending.staged_head = Some(head);
            pending.operations += 1;
        }
    }

    /// Durably commit the open transaction with `head` as its head.
    ///
    /// Returns `Ok(None)` when idle. On failure the transaction is gone and
    /// the durable head is unchanged.
    pub async fn commit(
        &mut self,
        storage: &dyn ChainStorageEffects,
        head: ChainHead,
    ) -> Result<Option<CommitSummary>, StorageError> {
        let Some(mut pending) = self.pending.take() else {
            return Ok(None);
        };

        if pending.staged_head != Some(head) {
            keys::stage_head(&mut pending.tx, &self.layout.state, &head);
        }

        let operations = pending.operations;
        let batch = pending.tx.into_batch();
        let writes = batch.len();
        storage.commit_batch(batch).await?;

        self.durable = head;
        tracing::debug!(operations, writes, %head, "Committed chain state transaction");
        Ok(Some(CommitSummary { head, operations }))
    }

    /// Discard the open transaction.
    pub fn rollback(&mut self, reason: &str) -> RollbackSummary {
        let operations = match self.pending.take() {
            Some(pending) => {
                let operations = pending.operations;
                pending.tx.rollback(reason);
                operations
            }
            None => 0,
        };
        RollbackSummary {
            operations,
            restore: self.durable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstate_core::{BlockHash, Namespace};
    use chainstate_effects::MemoryChainStorage;

    fn at(height: u64) -> ChainHead {
        ChainHead::At(Tip::new(height, BlockHash::repeat(height as u8)))
    }

    #[tokio::test]
    async fn test_batched_operations_commit_together() {
        let storage = MemoryChainStorage::new();
        let layout = StorageLayout::default();
        let mut coordinator = TransactionCoordinator::new(layout.clone(), ChainHead::Empty);

        assert!(coordinator.ensure_open(&storage));
        coordinator.transaction_mut().unwrap().put("a", b"1".to_vec());
        coordinator.stage_head(at(0));

        assert!(!coordinator.ensure_open(&storage));
        coordinator.transaction_mut().unwrap().put("b", b"2".to_vec());
        coordinator.stage_head(at(1));
        assert_eq!(coordinator.pending_operations(), 2);
        assert!(storage.is_empty().await);

        let summary = coordinator
            .commit(&storage, at(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.operations, 2);
        assert!(!coordinator.is_open());
        assert_eq!(coordinator.durable_head(), at(1));
        assert_eq!(
            storage.get(&layout.state, keys::HEIGHT_KEY).await.unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(storage.keys(&layout.data).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rollback_restores_durable_tip() {
        let storage = MemoryChainStorage::new();
        let mut coordinator = TransactionCoordinator::new(StorageLayout::default(), at(3));

        coordinator.ensure_open(&storage);
        coordinator.transaction_mut().unwrap().put("x", b"1".to_vec());
        coordinator.stage_head(at(4));

        let summary = coordinator.rollback("handler failed");
        assert_eq!(summary.operations, 1);
        assert_eq!(summary.restore, at(3));
        assert!(!coordinator.is_open());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_commit_stages_unstaged_tip() {
        let storage = MemoryChainStorage::new();
        let state = Namespace::new("chainstate");
        let mut coordinator =
            TransactionCoordinator::new(StorageLayout::default(), ChainHead::Empty);

        coordinator.ensure_open(&storage);
        coordinator.commit(&storage, at(9)).await.unwrap();
        assert_eq!(
            storage.get(&state, keys::HASH_KEY).await.unwrap(),
            Some(BlockHash::repeat(9).to_hex().into_bytes())
        );
    }

    #[tokio::test]
    async fn test_idle_commit_is_noop() {
        let storage = MemoryChainStorage::new();
        let mut coordinator =
            TransactionCoordinator::new(StorageLayout::default(), ChainHead::Empty);
        assert_eq!(
            coordinator.commit(&storage, ChainHead::Empty).await.unwrap(),
            None
        );
        assert_eq!(coordinator.rollback("nothing").operations, 0);
    }

    #[tokio::test]
    async fn test_unwound_head_is_persisted_and_restored() {
        let storage = MemoryChainStorage::new();
        let layout = StorageLayout::default();
        let unwound = ChainHead::Unwound {
            parent: BlockHash::ZERO,
        };
        let mut coordinator = TransactionCoordinator::new(layout.clone(), at(0));

        coordinator.ensure_open(&storage);
        coordinator.stage_head(unwound);
        coordinator.commit(&storage, unwound).await.unwrap();
        assert_eq!(coordinator.durable_tip(), None);
        assert_eq!(
            storage.get(&layout.state, keys::HEIGHT_KEY).await.unwrap(),
            Some(b"-1".to_vec())
        );

        coordinator.ensure_open(&storage);
        coordinator.stage_head(at(0));
        assert_eq!(coordinator.rollback("handler failed").restore, unwound);
    }
}
