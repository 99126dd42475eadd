//! Chain-order validation
//!
//! Pure comparison of an incoming operation against the current tip. No I/O
//! and no mutation, so the same `(head, operation)` always gets the same
//! verdict.

use chainstate_core::{BlockHash, ChainHead, HashField, Operation, OperationKind, OrderViolation};

/// Check that `op`, admitted as `kind`, links to `head`.
///
/// An empty chain accepts every operation (bootstrapping). Once a genesis
/// record has been retracted only a height 0 apply carrying the retracted
/// genesis parent is accepted. Height is checked before linkage.
pub fn validate_order<P>(
    head: &ChainHead,
    kind: OperationKind,
    op: &Operation<P>,
) -> Result<(), OrderViolation> {
    let (expected_height, expected_hash) = match (head, kind) {
        (ChainHead::Empty, _) => return Ok(()),
        (ChainHead::Unwound { .. }, OperationKind::Retract) => {
            return Err(OrderViolation::NothingToRetract { actual: op.height });
        }
        (ChainHead::Unwound { parent }, OperationKind::Apply) => (0, *parent),
        (ChainHead::At(tip), OperationKind::Apply) => {
            let next = tip
                .height
                .checked_add(1)
                .ok_or(OrderViolation::HeightOverflow { height: tip.height })?;
            (next, tip.hash)
        }
        (ChainHead::At(tip), OperationKind::Retract) => (tip.height, tip.hash),
    };

    if op.height != expected_height {
        return Err(OrderViolation::HeightMismatch {
            expected: expected_height,
            actual: op.height,
        });
    }
    check_link(kind, op, expected_hash)
}

fn check_link<P>(
    kind: OperationKind,
    op: &Operation<P>,
    expected: BlockHash,
) -> Result<(), OrderViolation> {
    let (field, actual) = match kind {
        OperationKind::Apply => (HashField::ParentHash, op.parent_hash),
        OperationKind::Retract => (HashField::Hash, op.hash),
    };
    if actual != expected {
        return Err(OrderViolation::HashMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstate_core::Tip;
    use proptest::prelude::*;

    fn h(byte: u8) -> BlockHash {
        BlockHash::repeat(byte)
    }

    fn at(height: u64, byte: u8) -> ChainHead {
        ChainHead::At(Tip::new(height, h(byte)))
    }

    #[test]
    fn test_empty_chain_accepts_anything() {
        let op = Operation::apply(123, h(9), h(10), ());
        assert!(validate_order(&ChainHead::Empty, OperationKind::Apply, &op).is_ok());
        assert!(validate_order(&ChainHead::Empty, OperationKind::Retract, &op).is_ok());
    }

    #[test]
    fn test_unwound_chain_requires_genesis_on_old_parent() {
        let head = ChainHead::Unwound { parent: h(7) };

        let genesis = Operation::apply(0, h(7), h(1), ());
        assert!(validate_order(&head, OperationKind::Apply, &genesis).is_ok());

        let unrelated = Operation::apply(40, h(39), h(40), ());
        assert_eq!(
            validate_order(&head, OperationKind::Apply, &unrelated),
            Err(OrderViolation::HeightMismatch {
                expected: 0,
                actual: 40
            })
        );

        let other_parent = Operation::apply(0, h(8), h(1), ());
        assert_eq!(
            validate_order(&head, OperationKind::Apply, &other_parent),
            Err(OrderViolation::HashMismatch {
                field: HashField::ParentHash,
                expected: h(7),
                actual: h(8),
            })
        );

        let retract = Operation::retract(0, h(7), h(1), ());
        assert_eq!(
            validate_order(&head, OperationKind::Retract, &retract),
            Err(OrderViolation::NothingToRetract { actual: 0 })
        );
    }

    #[test]
    fn test_tip_at_max_height_cannot_be_extended() {
        let head = at(u64::MAX, 1);
        let op = Operation::apply(u64::MAX, h(1), h(2), ());
        assert_eq!(
            validate_order(&head, OperationKind::Apply, &op),
            Err(OrderViolation::HeightOverflow { height: u64::MAX })
        );

        let retract = Operation::retract(u64::MAX, h(0), h(1), ());
        assert!(validate_order(&head, OperationKind::Retract, &retract).is_ok());
    }

    #[test]
    fn test_apply_must_extend_tip() {
        let tip = at(4, 4);

        let ok = Operation::apply(5, h(4), h(5), ());
        assert!(validate_order(&tip, OperationKind::Apply, &ok).is_ok());

        let skip = Operation::apply(6, h(4), h(6), ());
        assert_eq!(
            validate_order(&tip, OperationKind::Apply, &skip),
            Err(OrderViolation::HeightMismatch {
                expected: 5,
                actual: 6
            })
        );

        let fork = Operation::apply(5, h(3), h(5), ());
        assert_eq!(
            validate_order(&tip, OperationKind::Apply, &fork),
            Err(OrderViolation::HashMismatch {
                field: HashField::ParentHash,
                expected: h(4),
                actual: h(3),
            })
        );
    }

    #[test]
    fn test_retract_must_target_tip() {
        let tip = at(4, 4);

        let ok = Operation::retract(4, h(3), h(4), ());
        assert!(validate_order(&tip, OperationKind::Retract, &ok).is_ok());

        let below = Operation::retract(3, h(2), h(3), ());
        assert_eq!(
            validate_order(&tip, OperationKind::Retract, &below),
            Err(OrderViolation::HeightMismatch {
                expected: 4,
                actual: 3
            })
        );

        let other = Operation::retract(4, h(3), h(44), ());
        assert_eq!(
            validate_order(&tip, OperationKind::Retract, &other),
            Err(OrderViolation::HashMismatch {
                field: HashField::Hash,
                expected: h(4),
                actual: h(44),
            })
        );
    }

    #[test]
    fn test_height_checked_before_hash() {
        let tip = at(0, 0);
        let op = Operation::apply(5, h(7), h(5), ());
        assert!(matches!(
            validate_order(&tip, OperationKind::Apply, &op),
            Err(OrderViolation::HeightMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_verdict_is_deterministic(
            tip_height in 0u64..1000,
            tip_byte in any::<u8>(),
            op_height in 0u64..1000,
            parent in any::<u8>(),
            hash in any::<u8>(),
            retract in any::<bool>(),
        ) {
            let tip = at(tip_height, tip_byte);
            let kind = if retract { OperationKind::Retract } else { OperationKind::Apply };
            let op = Operation::apply(op_height, h(parent), h(hash), ());
            let first = validate_order(&tip, kind, &op);
            let second = validate_order(&tip, kind, &op);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_linked_apply_always_accepted(tip_height in 0u64..u64::MAX, tip_byte in any::<u8>(), next in any::<u8>()) {
            let tip = at(tip_height, tip_byte);
            let op = Operation::apply(tip_height + 1, h(tip_byte), h(next), ());
            prop_assert!(validate_order(&tip, OperationKind::Apply, &op).is_ok());
        }
    }
}
