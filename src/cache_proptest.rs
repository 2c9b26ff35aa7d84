//! Property-based tests for cache key chaining and change composition.

#[cfg(test)]
mod proptest_tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use crate::cache::CacheKeyChain;
    use crate::repository::test_support::repo;
    use crate::snapshot::{compose_changes, Snapshot};
    use crate::task::test_support::step;

    fn chain(runs: &[String]) -> CacheKeyChain {
        let steps: Vec<_> = runs.iter().map(|r| step(r)).collect();
        CacheKeyChain::new(&repo("prop"), "", &steps)
    }

    fn snapshot(files: &BTreeMap<String, String>) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (path, content) in files {
            snapshot.insert(path, content.clone());
        }
        snapshot
    }

    /// Small trees over a fixed set of paths so states collide often
    fn tree() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[abc]\\.txt", "[xy]{0,2}", 0..4)
    }

    proptest! {
        /// Property: a shared step prefix yields shared keys, and the first
        /// differing step changes its key and every key after it
        #[test]
        fn chains_share_exactly_the_common_prefix(
            common in prop::collection::vec("[a-z]{1,6}", 0..4),
            left in prop::collection::vec("[a-z]{1,6}", 1..4),
            right in prop::collection::vec("[A-Z]{1,6}", 1..4),
        ) {
            let a: Vec<String> = common.iter().chain(&left).cloned().collect();
            let b: Vec<String> = common.iter().chain(&right).cloned().collect();
            let (ka, kb) = (chain(&a), chain(&b));

            for i in 0..=common.len() {
                prop_assert_eq!(ka.key(i), kb.key(i));
            }
            for i in common.len() + 1..=a.len().min(b.len()) {
                prop_assert_ne!(&ka.key(i).hash, &kb.key(i).hash);
            }
        }

        /// Property: key computation is deterministic and counts steps
        #[test]
        fn chains_are_deterministic(runs in prop::collection::vec(".{0,12}", 0..5)) {
            let (first, second) = (chain(&runs), chain(&runs));
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.step_count(), runs.len());
            prop_assert_eq!(first.full().steps, runs.len());
        }

        /// Property: composing per-step changes gives exactly the change from
        /// the first state to the last
        #[test]
        fn composed_changes_equal_end_to_end_change(states in prop::collection::vec(tree(), 1..5)) {
            let snapshots: Vec<Snapshot> = states.iter().map(snapshot).collect();
            let per_step: Vec<_> = snapshots
                .windows(2)
                .map(|pair| pair[0].changes_to(&pair[1]))
                .collect();

            let composed = compose_changes(per_step.iter().map(Vec::as_slice));
            let direct = snapshots[0].changes_to(&snapshots[snapshots.len() - 1]);
            prop_assert_eq!(composed, direct);
        }
    }
}
