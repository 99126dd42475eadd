//! Fault-injecting storage for testing
//!
//! Wraps `MemoryChainStorage` and can be told to fail reads or commits. A
//! failed commit applies nothing, so tests can assert that storage still holds
//! exactly the last successful batch.

use async_trait::async_trait;
use chainstate_core::effects::{ChainStorageEffects, Namespace, StorageError, WriteBatch};
use chainstate_effects::MemoryChainStorage;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Faults {
    fail_reads: bool,
    fail_commits: bool,
    fail_next_commits: usize,
    commits: usize,
    failed_commits: usize,
    batch_sizes: Vec<usize>,
}

/// Memory storage with switchable failures and commit accounting
#[derive(Debug, Clone, Default)]
pub struct FaultyStorage {
    inner: MemoryChainStorage,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyStorage {
    /// Create an empty storage that never fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing memory store (clones share data)
    pub fn wrap(inner: MemoryChainStorage) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    /// The wrapped memory store
    pub fn inner(&self) -> &MemoryChainStorage {
        &self.inner
    }

    /// Make every read fail until cleared
    pub fn fail_reads(&self, fail: bool) {
        self.faults.lock().fail_reads = fail;
    }

    /// Make every commit fail until cleared
    pub fn fail_commits(&self, fail: bool) {
        self.faults.lock().fail_commits = fail;
    }

    /// Make the next `count` commits fail
    pub fn fail_next_commits(&self, count: usize) {
        self.faults.lock().fail_next_commits = count;
    }

    /// Successful commits so far
    pub fn commit_count(&self) -> usize {
        self.faults.lock().commits
    }

    /// Rejected commits so far
    pub fn failed_commit_count(&self) -> usize {
        self.faults.lock().failed_commits
    }

    /// Write count of every successful batch, in commit order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.faults.lock().batch_sizes.clone()
    }
}

#[async_trait]
impl ChainStorageEffects for FaultyStorage {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if self.faults.lock().fail_reads {
            return Err(StorageError::ReadFailed(format!(
                "injected read failure for {}",
                namespace.qualify(key)
            )));
        }
        self.inner.get(namespace, key).await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let writes = batch.len();
        {
            let mut faults = self.faults.lock();
            if faults.fail_commits || faults.fail_next_commits > 0 {
                faults.fail_next_commits = faults.fail_next_commits.saturating_sub(1);
                faults.failed_commits += 1;
                return Err(StorageError::CommitFailed(format!(
                    "injected commit failure ({writes} writes dropped)"
                )));
            }
        }

        self.inner.commit_batch(batch).await?;

        let mut faults = self.faults.lock();
        faults.commits += 1;
        faults.batch_sizes.push(writes);
        Ok(())
    }
}
