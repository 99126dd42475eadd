//! File-backed storage handler
//!
//! The whole store is kept in memory and persisted as one JSON snapshot.
//! Every batch commit writes the next snapshot to a sibling temp file, syncs
//! it to disk and renames it over the previous one, so a crash leaves either
//! the old or the new snapshot on disk, never a mix.

use async_trait::async_trait;
use chainstate_core::effects::{ChainStorageEffects, Namespace, StorageError, WriteBatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::memory::apply_batch;

type Entries = BTreeMap<(Namespace, String), Vec<u8>>;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    namespace: String,
    key: String,
    value: String,
}

/// Snapshot-file storage handler
#[derive(Debug, Clone)]
pub struct FileChainStorage {
    path: PathBuf,
    data: Arc<RwLock<Entries>>,
}

impl FileChainStorage {
    /// Open the store at `path`, loading the existing snapshot if present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read(&path).await {
            Ok(bytes) => decode_snapshot(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened file storage");

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(entries)),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &Entries) -> Result<(), StorageError> {
        let records: Vec<SnapshotRecord> = entries
            .iter()
            .map(|((namespace, key), value)| SnapshotRecord {
                namespace: namespace.as_str().to_string(),
                key: key.clone(),
                value: hex::encode(value),
            })
            .collect();
        let bytes = serde_json::to_vec(&records)
            .map_err(|e| StorageError::CommitFailed(format!("Failed to encode snapshot: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    StorageError::CommitFailed(format!("Failed to create directory: {e}"))
                })?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let write_failed =
            |e: std::io::Error| StorageError::CommitFailed(format!("Failed to write snapshot: {e}"));
        let mut file = fs::File::create(&tmp).await.map_err(write_failed)?;
        file.write_all(&bytes).await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::CommitFailed(format!("Failed to replace snapshot: {e}")))?;
        Ok(())
    }
}

fn decode_snapshot(path: &Path, bytes: &[u8]) -> Result<Entries, StorageError> {
    let records: Vec<SnapshotRecord> =
        serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupted {
            key: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut entries = Entries::new();
    for record in records {
        let namespace = Namespace::new(record.namespace);
        let value = hex::decode(&record.value).map_err(|e| StorageError::Corrupted {
            key: namespace.qualify(&record.key),
            reason: e.to_string(),
        })?;
        entries.insert((namespace, record.key), value);
    }
    Ok(entries)
}

#[async_trait]
impl ChainStorageEffects for FileChainStorage {
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(&(namespace.clone(), key.to_string())).cloned())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        apply_batch(&mut next, batch);

        // In-memory view only moves once the snapshot is on disk.
        self.persist(&next).await?;
        *data = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_storage_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let state = Namespace::new("chainstate");

        let storage = FileChainStorage::open(&path).await.unwrap();
        let mut tx = storage.begin_transaction(&state);
        tx.put("height", b"12".to_vec());
        tx.put("hash", b"ff".to_vec());
        storage.commit_batch(tx.into_batch()).await.unwrap();
        drop(storage);

        let reopened = FileChainStorage::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(&state, "height").await.unwrap(),
            Some(b"12".to_vec())
        );
        assert_eq!(reopened.get(&state, "hash").await.unwrap(), Some(b"ff".to_vec()));
    }

    #[tokio::test]
    async fn test_commit_replaces_stale_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, b"half a snapshot").unwrap();
        let data = Namespace::new("data");

        let storage = FileChainStorage::open(&path).await.unwrap();
        let mut tx = storage.begin_transaction(&data);
        tx.put("block/0", b"00".to_vec());
        storage.commit_batch(tx.into_batch()).await.unwrap();

        assert!(!tmp.exists());
        let on_disk = decode_snapshot(&path, &std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk.get(&(data, "block/0".to_string())),
            Some(&b"00".to_vec())
        );
    }

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileChainStorage::open(temp_dir.path().join("nested/state.json"))
            .await
            .unwrap();
        assert_eq!(storage.get(&Namespace::new("data"), "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = FileChainStorage::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }
}
