//! Property test strategies for chain state types

use chainstate_core::{BlockHash, ChainHead, Operation, OperationKind};
use proptest::prelude::*;

use crate::builders::{hash_on, parent_on};

// Re-export proptest for convenience
pub use proptest;

/// Arbitrary 32-byte hash
pub fn arb_block_hash() -> impl Strategy<Value = BlockHash> {
    proptest::array::uniform32(any::<u8>()).prop_map(BlockHash::new)
}

/// Arbitrary operation kind
pub fn arb_kind() -> impl Strategy<Value = OperationKind> {
    prop_oneof![Just(OperationKind::Apply), Just(OperationKind::Retract)]
}

/// Operation with arbitrary kind, height and hashes (usually invalid)
pub fn arb_operation() -> impl Strategy<Value = Operation<()>> {
    (arb_kind(), 0u64..1_000, arb_block_hash(), arb_block_hash()).prop_map(
        |(kind, height, parent_hash, hash)| Operation {
            kind: Some(kind),
            height,
            parent_hash,
            hash,
            payload: (),
        },
    )
}

/// A valid sequence of applies and retracts starting from an empty chain.
///
/// Each step is an apply or, when the chain is non-empty, a retract of the
/// current tip. Every apply uses a fresh branch byte so reorgs produce new
/// hashes at re-applied heights.
pub fn arb_chain_walk(max_len: usize) -> impl Strategy<Value = Vec<Operation<()>>> {
    proptest::collection::vec(any::<bool>(), 1..=max_len).prop_map(|steps| {
        let mut ops = Vec::with_capacity(steps.len());
        let mut chain: Vec<BlockHash> = Vec::new();
        let mut branch: u8 = 0;

        for apply in steps {
            if apply || chain.is_empty() {
                let height = chain.len() as u64;
                let parent = chain.last().copied().unwrap_or(parent_on(branch, 0));
                let hash = hash_on(branch, height);
                ops.push(Operation::apply(height, parent, hash, ()));
                chain.push(hash);
            } else {
                let height = (chain.len() - 1) as u64;
                let hash = chain.pop().unwrap();
                let parent = chain.last().copied().unwrap_or(BlockHash::ZERO);
                ops.push(Operation::retract(height, parent, hash, ()));
                branch = branch.wrapping_add(1);
            }
        }
        ops
    })
}

/// Head a valid walk ends at
pub fn fold_walk(ops: &[Operation<()>]) -> ChainHead {
    ops.iter().fold(ChainHead::Empty, |head, op| match op.kind {
        Some(kind) => ChainHead::after(kind, op),
        None => head,
    })
}
