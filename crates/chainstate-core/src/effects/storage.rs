//! Transactional key-value storage effects
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `chainstate-effects` (memory, file)
//! - **Usage**: tip persistence and handler writes to the derived store
//!
//! Transactions are buffered on the caller side: a `StorageTransaction`
//! accumulates puts and deletes and is turned into a `WriteBatch` that the
//! storage engine applies atomically in `commit_batch`. Rolling back is
//! dropping the buffer, so nothing reaches the engine before commit.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Reading a key failed
    #[error("Storage read failed: {0}")]
    ReadFailed(String),
    /// Writing outside of a batch commit failed
    #[error("Storage write failed: {0}")]
    WriteFailed(String),
    /// Atomic batch commit failed; nothing from the batch is visible
    #[error("Storage commit failed: {0}")]
    CommitFailed(String),
    /// A persisted value could not be decoded
    #[error("Corrupted value for {key}: {reason}")]
    Corrupted {
        /// Namespaced key holding the bad value
        key: String,
        /// Why decoding failed
        reason: String,
    },
}

/// Sub-namespace of the key space (the "sublevel" of a flat store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Namespace name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Flat key combining this namespace and `key`.
    pub fn qualify(&self, key: &str) -> String {
        format!("{}/{}", self.0, key)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Single write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set `key` in `namespace` to `value`
    Put {
        /// Target namespace
        namespace: Namespace,
        /// Key within the namespace
        key: String,
        /// New value
        value: Vec<u8>,
    },
    /// Remove `key` from `namespace`
    Delete {
        /// Target namespace
        namespace: Namespace,
        /// Key within the namespace
        key: String,
    },
}

/// Ordered set of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a put.
    pub fn put(&mut self, namespace: &Namespace, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            namespace: namespace.clone(),
            key: key.into(),
            value,
        });
    }

    /// Append a delete.
    pub fn delete(&mut self, namespace: &Namespace, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete {
            namespace: namespace.clone(),
            key: key.into(),
        });
    }

    /// Writes in application order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Number of writes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch holds no writes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchOp;
    type IntoIter = std::vec::IntoIter<BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Buffered multi-put transaction scoped to a default namespace.
///
/// Later writes to the same key replace earlier ones. Handlers receive it as
/// `&mut StorageTransaction`; only the pipeline commits or rolls it back.
#[derive(Debug)]
pub struct StorageTransaction {
    namespace: Namespace,
    writes: BTreeMap<(Namespace, String), Option<Vec<u8>>>,
}

impl StorageTransaction {
    /// Open a transaction whose plain `put`/`delete` target `namespace`.
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            writes: BTreeMap::new(),
        }
    }

    /// Stage `key = value` in the default namespace.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let namespace = self.namespace.clone();
        self.put_in(&namespace, key, value);
    }

    /// Stage `key = value` in another namespace.
    pub fn put_in(
        &mut self,
        namespace: &Namespace,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) {
        self.writes
            .insert((namespace.clone(), key.into()), Some(value.into()));
    }

    /// Stage removal of `key` from the default namespace.
    pub fn delete(&mut self, key: impl Into<String>) {
        let namespace = self.namespace.clone();
        self.delete_in(&namespace, key);
    }

    /// Stage removal of `key` from another namespace.
    pub fn delete_in(&mut self, namespace: &Namespace, key: impl Into<String>) {
        self.writes.insert((namespace.clone(), key.into()), None);
    }

    /// Read-your-writes lookup in the default namespace.
    ///
    /// `None` means the key is untouched by this transaction, `Some(None)`
    /// means it is staged for deletion.
    pub fn staged(&self, key: &str) -> Option<Option<&[u8]>> {
        self.staged_in(&self.namespace, key)
    }

    /// Read-your-writes lookup in another namespace.
    pub fn staged_in(&self, namespace: &Namespace, key: &str) -> Option<Option<&[u8]>> {
        self.writes
            .get(&(namespace.clone(), key.to_string()))
            .map(|value| value.as_deref())
    }

    /// Number of distinct keys written.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Discard every staged write.
    pub fn rollback(self, reason: &str) -> usize {
        let discarded = self.writes.len();
        tracing::debug!(
            namespace = %self.namespace,
            discarded,
            reason,
            "Storage transaction rolled back"
        );
        discarded
    }

    /// Convert the staged writes into a batch for `commit_batch`.
    pub fn into_batch(self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for ((namespace, key), value) in self.writes {
            match value {
                Some(value) => batch.put(&namespace, key, value),
                None => batch.delete(&namespace, key),
            }
        }
        batch
    }
}

/// Storage engine contract.
#[async_trait]
pub trait ChainStorageEffects: Send + Sync {
    /// Read `key` from `namespace`; `Ok(None)` when absent.
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Apply every write in `batch` atomically.
    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Begin a buffered transaction against `namespace`.
    fn begin_transaction(&self, namespace: &Namespace) -> StorageTransaction {
        StorageTransaction::new(namespace.clone())
    }
}

/// Blanket implementation for Arc<T> where T: ChainStorageEffects
#[async_trait]
impl<T: ChainStorageEffects + ?Sized> ChainStorageEffects for std::sync::Arc<T> {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(namespace, key).await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        (**self).commit_batch(batch).await
    }

    fn begin_transaction(&self, namespace: &Namespace) -> StorageTransaction {
        (**self).begin_transaction(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_writes_replace_earlier() {
        let data = Namespace::new("data");
        let state = Namespace::new("chainstate");
        let mut tx = StorageTransaction::new(data.clone());

        tx.put("utxo", b"one".to_vec());
        tx.put("utxo", b"two".to_vec());
        tx.put_in(&state, "height", b"4".to_vec());
        tx.delete_in(&state, "height");

        assert_eq!(tx.len(), 2);
        assert_eq!(tx.staged("utxo"), Some(Some(&b"two"[..])));
        assert_eq!(tx.staged_in(&state, "height"), Some(None));
        assert_eq!(tx.staged("missing"), None);

        let batch = tx.into_batch();
        assert_eq!(batch.len(), 2);
        assert!(batch.ops().contains(&BatchOp::Delete {
            namespace: state,
            key: "height".into(),
        }));
    }

    #[test]
    fn test_rollback_reports_discarded_writes() {
        let mut tx = StorageTransaction::new(Namespace::new("data"));
        tx.put("a", b"1".to_vec());
        tx.put("b", b"2".to_vec());
        assert_eq!(tx.rollback("handler failed"), 2);
    }

    #[test]
    fn test_namespace_qualify() {
        assert_eq!(Namespace::new("chainstate").qualify("hash"), "chainstate/hash");
    }
}
