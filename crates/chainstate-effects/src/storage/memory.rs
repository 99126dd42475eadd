//! In-memory storage handler

use async_trait::async_trait;
use chainstate_core::effects::{BatchOp, ChainStorageEffects, Namespace, StorageError, WriteBatch};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Entries = BTreeMap<(Namespace, String), Vec<u8>>;

/// In-memory storage handler
///
/// Clones share the same underlying map, so a test can keep one clone for
/// inspection while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryChainStorage {
    data: Arc<RwLock<Entries>>,
}

impl MemoryChainStorage {
    /// Create an empty memory storage handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, keyed by namespaced key (`ns/key`).
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let data = self.data.read().await;
        data.iter()
            .map(|((namespace, key), value)| (namespace.qualify(key), value.clone()))
            .collect()
    }

    /// Keys present in `namespace`.
    pub async fn keys(&self, namespace: &Namespace) -> Vec<String> {
        let data = self.data.read().await;
        data.keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Number of stored entries across all namespaces.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

pub(crate) fn apply_batch(entries: &mut Entries, batch: WriteBatch) {
    for op in batch {
        match op {
            BatchOp::Put {
                namespace,
                key,
                value,
            } => {
                entries.insert((namespace, key), value);
            }
            BatchOp::Delete { namespace, key } => {
                entries.remove(&(namespace, key));
            }
        }
    }
}

#[async_trait]
impl ChainStorageEffects for MemoryChainStorage {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(&(namespace.clone(), key.to_string())).cloned())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        // Single write guard: readers see all of the batch or none of it.
        let mut data = self.data.write().await;
        apply_batch(&mut data, batch);
        Ok(())
    }
}
