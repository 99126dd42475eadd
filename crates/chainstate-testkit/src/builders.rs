//! Operation builders
//!
//! Deterministic hashes and ready-made chains. `hash_on(branch, height)`
//! gives every (branch, height) pair its own hash, so forks are easy to
//! build: retract back to the fork point, then apply on another branch.

use chainstate_core::{BlockHash, Operation, Tip, HASH_LEN};

/// Hash of the record at `height` on `branch`.
pub fn hash_on(branch: u8, height: u64) -> BlockHash {
    let mut bytes = [0xcc; HASH_LEN];
    bytes[0] = branch;
    bytes[1..9].copy_from_slice(&height.to_be_bytes());
    BlockHash::new(bytes)
}

/// Hash of the record at `height` on the main branch.
pub fn hash_of(height: u64) -> BlockHash {
    hash_on(0, height)
}

/// Parent hash of the record at `height` on `branch`.
///
/// Height 0 has the zero hash as parent.
pub fn parent_on(branch: u8, height: u64) -> BlockHash {
    match height.checked_sub(1) {
        Some(parent) => hash_on(branch, parent),
        None => BlockHash::ZERO,
    }
}

/// Tip at `height` on the main branch.
pub fn tip_at(height: u64) -> Tip {
    Tip::new(height, hash_of(height))
}

/// Apply the main-branch record at `height`.
pub fn apply_op(height: u64) -> Operation<()> {
    Operation::apply(height, parent_on(0, height), hash_of(height), ())
}

/// Retract the main-branch record at `height`.
pub fn retract_op(height: u64) -> Operation<()> {
    Operation::retract(height, parent_on(0, height), hash_of(height), ())
}

/// Apply the record at `height` on `branch`, whose parent is `parent`.
pub fn apply_on(branch: u8, height: u64, parent: BlockHash) -> Operation<()> {
    Operation::apply(height, parent, hash_on(branch, height), ())
}

/// `len` consecutive main-branch applies starting at `from`.
pub fn chain(from: u64, len: u64) -> Vec<Operation<()>> {
    (from..from + len).map(apply_op).collect()
}

/// Operation with no kind, as a malformed decoded record would arrive.
pub fn kindless_op(height: u64) -> Operation<()> {
    Operation {
        kind: None,
        ..apply_op(height)
    }
}
