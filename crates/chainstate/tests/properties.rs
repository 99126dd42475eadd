//! Property tests for tip tracking through the pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use chainstate::{
    load_initial_state, validate_order, ChainState, ChainStateConfig, ErrorPolicy,
    StorageLayout,
};
use chainstate_testkit::strategies::{arb_chain_walk, arb_operation, fold_walk};
use chainstate_testkit::{FaultyStorage, RecordingHandler};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn config(batched: bool) -> ChainStateConfig {
    ChainStateConfig {
        commit_interval_ms: if batched { 60_000 } else { 0 },
        error_policy: ErrorPolicy::Continue,
        ..ChainStateConfig::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tip_is_fold_of_admitted_operations(ops in arb_chain_walk(24), batched in any::<bool>()) {
        let expected = fold_walk(&ops);
        let (head, tip, durable, keys) = runtime().block_on(async {
            let storage = FaultyStorage::new();
            let state = ChainState::spawn(storage.clone(), RecordingHandler::new(), config(batched))
                .unwrap();
            for op in ops {
                state.submit(op).await.unwrap();
            }
            let head = state.head().unwrap();
            let tip = state.tip().unwrap();
            let durable = state.finish().await.unwrap();
            let keys = storage.inner().keys(&StorageLayout::default().data).await;
            (head, tip, durable, keys)
        });

        prop_assert_eq!(head, expected);
        prop_assert_eq!(tip, expected.tip());
        prop_assert_eq!(durable, expected.tip());
        let expected_keys: Vec<String> = match expected.tip() {
            Some(tip) => (0..=tip.height).map(RecordingHandler::block_key).collect(),
            None => Vec::new(),
        };
        prop_assert_eq!(keys, expected_keys);
    }

    #[test]
    fn rejected_operations_change_nothing(
        prefix in arb_chain_walk(8),
        candidate in arb_operation(),
    ) {
        let before = fold_walk(&prefix);
        let kind = candidate.kind.unwrap();
        let expect_reject = validate_order(&before, kind, &candidate).is_err();

        let (result, after, calls_before, calls_after) = runtime().block_on(async {
            let handler = RecordingHandler::new();
            let state = ChainState::spawn(FaultyStorage::new(), handler.clone(), config(true))
                .unwrap();
            for op in prefix {
                state.submit(op).await.unwrap();
            }
            let calls_before = handler.calls().len();
            let result = state.submit(candidate).await;
            let after = state.head().unwrap();
            (result, after, calls_before, handler.calls().len())
        });

        prop_assert_eq!(result.is_err(), expect_reject);
        if expect_reject {
            prop_assert_eq!(after, before);
            prop_assert_eq!(calls_after, calls_before);
        }
    }

    #[test]
    fn loading_is_idempotent(ops in arb_chain_walk(16)) {
        runtime().block_on(async {
            let storage = FaultyStorage::new();
            let state = ChainState::spawn(storage.clone(), RecordingHandler::new(), config(false))
                .unwrap();
            for op in ops {
                state.submit(op).await.unwrap();
            }
            let head = state.head().unwrap();
            state.finish().await.unwrap();

            let layout = StorageLayout::default();
            let first = load_initial_state(&storage, &layout, None).await.unwrap();
            let second = load_initial_state(&storage, &layout, None).await.unwrap();
            assert_eq!(first, second);
            assert_eq!(first.head, head);
        });
    }
}
