//! Chain position types
//!
//! A `Tip` is the authoritative `(height, hash)` position of the tracked
//! sequence. `Operation`s move it forward (`Apply`) or backward (`Retract`)
//! by exactly one record. `ChainHead` is the tip plus what is left of the
//! chain once its genesis record is retracted.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::ChainStateError;

/// Length in bytes of a record hash.
pub const HASH_LEN: usize = 32;

/// Fixed-length record hash, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockHash([u8; HASH_LEN]);

impl BlockHash {
    /// The all-zero hash.
    pub const ZERO: BlockHash = BlockHash([0u8; HASH_LEN]);

    /// Wrap raw hash bytes.
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash with every byte set to `byte` (handy for fixtures).
    pub const fn repeat(byte: u8) -> Self {
        Self([byte; HASH_LEN])
    }

    /// Parse from a byte slice, rejecting any length other than `HASH_LEN`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChainStateError> {
        let array: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
            ChainStateError::structural(format!(
                "hash must be {HASH_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, ChainStateError> {
        let bytes = hex::decode(s)
            .map_err(|e| ChainStateError::structural(format!("invalid hash hex: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; HASH_LEN]> for BlockHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for BlockHash {
    type Err = ChainStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Authoritative position of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tip {
    /// Height of the record at the tip
    pub height: u64,
    /// Hash of the record at the tip
    pub hash: BlockHash,
}

impl Tip {
    /// Create a tip at `height` with `hash`.
    pub const fn new(height: u64, hash: BlockHash) -> Self {
        Self { height, hash }
    }
}

impl fmt::Display for Tip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.height, self.hash)
    }
}

/// Where the next operation has to attach.
///
/// `Unwound` is the chain after its genesis record was retracted: there is
/// no tip, but the next apply must still be a height 0 record linking to the
/// retracted genesis parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChainHead {
    /// Nothing has ever been admitted
    #[default]
    Empty,
    /// Genesis was retracted
    Unwound {
        /// Parent hash the next genesis must carry
        parent: BlockHash,
    },
    /// A record is at the tip
    At(Tip),
}

impl ChainHead {
    /// The head that results from admitting `op` as `kind`.
    pub fn after<P>(kind: OperationKind, op: &Operation<P>) -> Self {
        match kind {
            OperationKind::Apply => Self::At(Tip::new(op.height, op.hash)),
            OperationKind::Retract => match op.height.checked_sub(1) {
                Some(height) => Self::At(Tip::new(height, op.parent_hash)),
                None => Self::Unwound {
                    parent: op.parent_hash,
                },
            },
        }
    }

    /// The record at the tip, if any.
    pub fn tip(&self) -> Option<Tip> {
        match self {
            Self::At(tip) => Some(*tip),
            Self::Empty | Self::Unwound { .. } => None,
        }
    }
}

impl From<Option<Tip>> for ChainHead {
    fn from(tip: Option<Tip>) -> Self {
        tip.map_or(Self::Empty, Self::At)
    }
}

impl fmt::Display for ChainHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Unwound { parent } => write!(f, "unwound({parent})"),
            Self::At(tip) => tip.fmt(f),
        }
    }
}

/// Fixed genesis/checkpoint, written once at first initialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartPoint {
    /// Timestamp of the starting record
    pub time: u64,
    /// Height of the starting record
    pub height: u64,
    /// Hash of the starting record, if known
    pub hash: Option<BlockHash>,
}

impl StartPoint {
    /// Defaults overridden by whichever fields `over` sets.
    pub fn with_override(over: Option<&StartOverride>) -> Self {
        let mut start = Self::default();
        if let Some(over) = over {
            if let Some(time) = over.time {
                start.time = time;
            }
            if let Some(height) = over.height {
                start.height = height;
            }
            if over.hash.is_some() {
                start.hash = over.hash;
            }
        }
        start
    }
}

/// Partial start point supplied through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOverride {
    /// Override for `StartPoint::time`
    pub time: Option<u64>,
    /// Override for `StartPoint::height`
    pub height: Option<u64>,
    /// Override for `StartPoint::hash`
    pub hash: Option<BlockHash>,
}

/// Direction of chain movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Extend the chain by one record
    Apply,
    /// Revert the record currently at the tip
    Retract,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Apply => f.write_str("apply"),
            OperationKind::Retract => f.write_str("retract"),
        }
    }
}

/// One unit of chain movement as delivered by an upstream decoder.
///
/// `kind` is optional because decoded records may omit it; the pipeline
/// rejects such records with a structural error before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation<P> {
    /// Apply or retract; `None` when the record carried no discriminator
    #[serde(default)]
    pub kind: Option<OperationKind>,
    /// Height of the record this operation refers to
    pub height: u64,
    /// Hash of the record's parent
    pub parent_hash: BlockHash,
    /// Hash of the record itself
    pub hash: BlockHash,
    /// Opaque record payload handed to the handler
    pub payload: P,
}

impl<P> Operation<P> {
    /// Operation applying the record at `height`.
    pub fn apply(height: u64, parent_hash: BlockHash, hash: BlockHash, payload: P) -> Self {
        Self {
            kind: Some(OperationKind::Apply),
            height,
            parent_hash,
            hash,
            payload,
        }
    }

    /// Operation retracting the record at `height`.
    pub fn retract(height: u64, parent_hash: BlockHash, hash: BlockHash, payload: P) -> Self {
        Self {
            kind: Some(OperationKind::Retract),
            height,
            parent_hash,
            hash,
            payload,
        }
    }

    /// The operation's discriminator, or a structural error if it has none.
    pub fn require_kind(&self) -> Result<OperationKind, ChainStateError> {
        self.kind
            .ok_or_else(|| ChainStateError::structural("operation must have a kind (apply or retract)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_parsing() {
        let hash = BlockHash::repeat(0xab);
        assert_eq!(BlockHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(BlockHash::from_hex("abcd").is_err());
        assert!(BlockHash::from_hex("zz").is_err());
    }

    #[test]
    fn test_head_after_apply_and_retract() {
        let op = Operation::apply(7, BlockHash::repeat(6), BlockHash::repeat(7), ());
        assert_eq!(
            ChainHead::after(OperationKind::Apply, &op),
            ChainHead::At(Tip::new(7, BlockHash::repeat(7)))
        );

        let op = Operation::retract(7, BlockHash::repeat(6), BlockHash::repeat(7), ());
        assert_eq!(
            ChainHead::after(OperationKind::Retract, &op),
            ChainHead::At(Tip::new(6, BlockHash::repeat(6)))
        );
    }

    #[test]
    fn test_retracting_genesis_keeps_its_parent() {
        let op = Operation::retract(0, BlockHash::repeat(9), BlockHash::repeat(1), ());
        let head = ChainHead::after(OperationKind::Retract, &op);
        assert_eq!(
            head,
            ChainHead::Unwound {
                parent: BlockHash::repeat(9)
            }
        );
        assert_eq!(head.tip(), None);
        assert_eq!(ChainHead::from(None::<Tip>), ChainHead::Empty);
    }

    #[test]
    fn test_start_override_merges_fields() {
        let over = StartOverride {
            height: Some(100),
            ..Default::default()
        };
        let start = StartPoint::with_override(Some(&over));
        assert_eq!(start.time, 0);
        assert_eq!(start.height, 100);
        assert_eq!(start.hash, None);
        assert_eq!(StartPoint::with_override(None), StartPoint::default());
    }

    #[test]
    fn test_operation_without_kind_is_structural() {
        let json = format!(
            r#"{{"height":1,"parent_hash":"{}","hash":"{}","payload":null}}"#,
            BlockHash::ZERO,
            BlockHash::repeat(1)
        );
        let op: Operation<()> = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            op.require_kind(),
            Err(ChainStateError::Structural { .. })
        ));
    }
}
