//! Canonical tip-metadata keys and value encodings.
//!
//! - `start`: JSON start point
//! - `height`: ASCII decimal, `-1` once the genesis record is retracted
//! - `hash`: lowercase hex; the retracted genesis parent at height `-1`

use chainstate_core::{
    BlockHash, ChainHead, Namespace, StartPoint, StorageError, StorageTransaction, Tip,
};

/// Key of the persisted start point.
pub const START_KEY: &str = "start";
/// Key of the persisted tip height.
pub const HEIGHT_KEY: &str = "height";
/// Key of the persisted tip hash.
pub const HASH_KEY: &str = "hash";

/// Persisted height of an unwound chain.
pub const UNWOUND_HEIGHT: &str = "-1";

/// Stage `head` into `tx` under `namespace`; an empty chain removes both keys.
pub fn stage_head(tx: &mut StorageTransaction, namespace: &Namespace, head: &ChainHead) {
    match head {
        ChainHead::At(tip) => {
            tx.put_in(namespace, HEIGHT_KEY, tip.height.to_string().into_bytes());
            tx.put_in(namespace, HASH_KEY, tip.hash.to_hex().into_bytes());
        }
        ChainHead::Unwound { parent } => {
            tx.put_in(namespace, HEIGHT_KEY, UNWOUND_HEIGHT.as_bytes().to_vec());
            tx.put_in(namespace, HASH_KEY, parent.to_hex().into_bytes());
        }
        ChainHead::Empty => {
            tx.delete_in(namespace, HEIGHT_KEY);
            tx.delete_in(namespace, HASH_KEY);
        }
    }
}

/// Decode the persisted `height`/`hash` pair.
///
/// A height without a hash is corrupted; a hash without a height is ignored.
pub fn decode_head(
    namespace: &Namespace,
    height: Option<&[u8]>,
    hash: Option<&[u8]>,
) -> Result<ChainHead, StorageError> {
    let Some(height) = height else {
        return Ok(ChainHead::Empty);
    };
    let hash = hash.ok_or_else(|| StorageError::Corrupted {
        key: namespace.qualify(HASH_KEY),
        reason: format!(
            "height {} is persisted without a hash",
            String::from_utf8_lossy(height)
        ),
    })?;
    let hash = decode_hash(namespace, hash)?;

    if std::str::from_utf8(height).map(str::trim) == Ok(UNWOUND_HEIGHT) {
        return Ok(ChainHead::Unwound { parent: hash });
    }
    Ok(ChainHead::At(Tip::new(decode_height(namespace, height)?, hash)))
}

/// Decode a persisted height.
pub fn decode_height(namespace: &Namespace, bytes: &[u8]) -> Result<u64, StorageError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| StorageError::Corrupted {
            key: namespace.qualify(HEIGHT_KEY),
            reason: format!("not a decimal height: {:?}", String::from_utf8_lossy(bytes)),
        })
}

/// Decode a persisted hash.
pub fn decode_hash(namespace: &Namespace, bytes: &[u8]) -> Result<BlockHash, StorageError> {
    let corrupted = |reason: String| StorageError::Corrupted {
        key: namespace.qualify(HASH_KEY),
        reason,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| corrupted(e.to_string()))?;
    BlockHash::from_hex(text.trim()).map_err(|e| corrupted(e.to_string()))
}

/// Encode a start point as JSON.
pub fn encode_start(start: &StartPoint) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(start)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode start point: {e}")))
}

/// Decode a JSON start point.
pub fn decode_start(namespace: &Namespace, bytes: &[u8]) -> Result<StartPoint, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupted {
        key: namespace.qualify(START_KEY),
        reason: e.to_string(),
    })
}
