//! Property tests for reachability-based garbage collection.

use dolphin_server::{GarbageCollector, ServerError};
use proptest::prelude::*;
use std::collections::HashSet;

fn bean(i: usize) -> String {
    format!("bean-{i}")
}

fn reachable(count: usize, roots: &[bool], edges: &[(usize, usize)]) -> HashSet<usize> {
    let mut seen: HashSet<usize> = (0..count).filter(|&i| roots[i]).collect();
    let mut stack: Vec<usize> = seen.iter().copied().collect();
    while let Some(node) = stack.pop() {
        for &(from, to) in edges {
            if from == node && seen.insert(to) {
                stack.push(to);
            }
        }
    }
    seen
}

proptest! {
    #[test]
    fn gc_keeps_exactly_the_reachable_beans(
        roots in prop::collection::vec(any::<bool>(), 1..24),
        raw_edges in prop::collection::vec((0usize..24, 0usize..24), 0..64),
    ) {
        let count = roots.len();
        let mut gc = GarbageCollector::new(usize::MAX);
        for (i, &root) in roots.iter().enumerate() {
            gc.on_bean_created(&bean(i), "Node", root).unwrap();
        }

        let mut accepted = Vec::new();
        for (from, to) in raw_edges {
            let (from, to) = (from % count, to % count);
            match gc.add_reference(&bean(from), &bean(to)) {
                Ok(()) => accepted.push((from, to)),
                Err(err) => prop_assert!(
                    matches!(err, ServerError::CircularDependency { .. }),
                    "unexpected error {err}"
                ),
            }
        }

        let alive = reachable(count, &roots, &accepted);
        let collected: HashSet<String> = gc.gc().into_iter().collect();
        for i in 0..count {
            prop_assert_eq!(gc.is_managed(&bean(i)), alive.contains(&i));
            prop_assert_eq!(collected.contains(&bean(i)), !alive.contains(&i));
        }
        prop_assert!(gc.gc().is_empty());
    }

    #[test]
    fn ref_counts_match_incoming_edges(
        raw_edges in prop::collection::vec((0usize..12, 0usize..12), 0..40),
    ) {
        let mut gc = GarbageCollector::new(usize::MAX);
        for i in 0..12 {
            gc.on_bean_created(&bean(i), "Node", true).unwrap();
        }
        let mut incoming = [0usize; 12];
        for (from, to) in raw_edges {
            if gc.add_reference(&bean(from), &bean(to)).is_ok() {
                incoming[to] += 1;
            }
        }
        for (i, expected) in incoming.iter().enumerate() {
            prop_assert_eq!(gc.ref_count(&bean(i)), Some(*expected));
        }
    }
}
