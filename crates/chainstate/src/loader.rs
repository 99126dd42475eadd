//! Startup state loading
//!
//! Runs once before the pipeline admits anything: bootstraps the start point
//! on first use, then reads the persisted head.

use chainstate_core::{ChainHead, ChainStorageEffects, StartOverride, StartPoint, StorageError};

use crate::config::StorageLayout;
use crate::keys::{self, HASH_KEY, HEIGHT_KEY, START_KEY};

/// What the pipeline starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    /// Persisted head
    pub head: ChainHead,
    /// Persisted (or just written) start point
    pub start: StartPoint,
}

/// Load the start point and head, writing the start point if absent.
///
/// Idempotent: calling it again against the same storage yields the same
/// state.
pub async fn load_initial_state(
    storage: &dyn ChainStorageEffects,
    layout: &StorageLayout,
    start_override: Option<&StartOverride>,
) -> Result<InitialState, StorageError> {
    let start = match storage.get(&layout.state, START_KEY).await? {
        Some(bytes) => keys::decode_start(&layout.state, &bytes)?,
        None => {
            let start = StartPoint::with_override(start_override);
            let mut tx = storage.begin_transaction(&layout.state);
            tx.put(START_KEY, keys::encode_start(&start)?);
            storage.commit_batch(tx.into_batch()).await?;
            tracing::info!(
                height = start.height,
                time = start.time,
                hash = ?start.hash,
                "Initialized chain start point"
            );
            start
        }
    };

    let height = storage.get(&layout.state, HEIGHT_KEY).await?;
    let hash = match height {
        Some(_) => storage.get(&layout.state, HASH_KEY).await?,
        None => None,
    };
    let head = keys::decode_head(&layout.state, height.as_deref(), hash.as_deref())?;

    Ok(InitialState { head, start })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstate_core::{BlockHash, StorageTransaction, Tip};
    use chainstate_effects::MemoryChainStorage;

    #[tokio::test]
    async fn test_fresh_store_writes_start_and_has_no_tip() {
        let storage = MemoryChainStorage::new();
        let layout = StorageLayout::default();

        let state = load_initial_state(&storage, &layout, None).await.unwrap();
        assert_eq!(state.head, ChainHead::Empty);
        assert_eq!(state.start, StartPoint::default());
        assert!(storage.get(&layout.state, START_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_override_applies_only_on_first_load() {
        let storage = MemoryChainStorage::new();
        let layout = StorageLayout::default();
        let first = StartOverride {
            height: Some(500),
            ..Default::default()
        };
        let second = StartOverride {
            height: Some(900),
            ..Default::default()
        };

        let state = load_initial_state(&storage, &layout, Some(&first)).await.unwrap();
        assert_eq!(state.start.height, 500);
        let state = load_initial_state(&storage, &layout, Some(&second)).await.unwrap();
        assert_eq!(state.start.height, 500);
    }

    #[tokio::test]
    async fn test_persisted_tip_is_loaded() {
        let storage = MemoryChainStorage::new();
        let layout = StorageLayout::default();
        let mut tx = StorageTransaction::new(layout.state.clone());
        let head = ChainHead::At(Tip::new(123, BlockHash::repeat(0x61)));
        keys::stage_head(&mut tx, &layout.state, &head);
        storage.commit_batch(tx.into_batch()).await.unwrap();

        let first = load_initial_state(&storage, &layout, None).await.unwrap();
        let second = load_initial_state(&storage, &layout, None).await.unwrap();
        assert_eq!(first.head, head);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_height_without_hash_is_corrupted() {
        let storage = MemoryChainStorage::new();
        let layout = StorageLayout::default();
        let mut tx = StorageTransaction::new(layout.state.clone());
        tx.put(HEIGHT_KEY, b"7".to_vec());
        storage.commit_batch(tx.into_batch()).await.unwrap();

        let err = load_initial_state(&storage, &layout, None).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn test_unwound_chain_is_loaded() {
        let storage = MemoryChainStorage::new();
        let layout = StorageLayout::default();
        let mut tx = StorageTransaction::new(layout.state.clone());
        tx.put(HEIGHT_KEY, b"-1".to_vec());
        tx.put(HASH_KEY, BlockHash::repeat(3).to_hex().into_bytes());
        storage.commit_batch(tx.into_batch()).await.unwrap();

        let state = load_initial_state(&storage, &layout, None).await.unwrap();
        assert_eq!(
            state.head,
            ChainHead::Unwound {
                parent: BlockHash::repeat(3)
            }
        );
    }
}
