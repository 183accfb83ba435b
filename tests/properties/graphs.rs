//! Property tests for the shared graph traversal.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use strata::domain::patterns::recursive_dependency::closure;
use strata::domain::services::{topological_order, CyclePolicy};

type Graph = BTreeMap<u8, BTreeSet<u8>>;

fn graph() -> impl Strategy<Value = Graph> {
    proptest::collection::btree_map(0u8..12, proptest::collection::btree_set(0u8..12, 0..4), 0..12)
}

/// Edges only point at smaller nodes.
fn dag() -> impl Strategy<Value = Graph> {
    graph().prop_map(|g| {
        g.into_iter()
            .map(|(n, succ)| (n, succ.into_iter().filter(|s| *s < n).collect()))
            .collect()
    })
}

fn successors(g: &Graph) -> impl FnMut(&u8) -> Vec<u8> + '_ {
    move |n: &u8| g.get(n).map(|s| s.iter().copied().collect()).unwrap_or_default()
}

fn reachable(g: &Graph, start: u8) -> BTreeSet<u8> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![start];
    while let Some(n) = stack.pop() {
        for s in g.get(&n).into_iter().flatten() {
            if seen.insert(*s) {
                stack.push(*s);
            }
        }
    }
    seen.remove(&start);
    seen
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: With cycles allowed the closure is exactly the reachable
    /// set minus the start, sorted.
    #[test]
    fn property_closure_is_reachable_set(g in graph(), start in 0u8..12) {
        let found = closure(&start, successors(&g), CyclePolicy::Allow, 64).unwrap();
        let expected: Vec<u8> = reachable(&g, start).into_iter().collect();
        prop_assert_eq!(found, expected);
    }

    /// PROPERTY: Acyclic graphs pass under the reject policy.
    #[test]
    fn property_dag_closure_never_cyclic(g in dag(), start in 0u8..12) {
        prop_assert!(closure(&start, successors(&g), CyclePolicy::Reject, 64).is_ok());
    }

    /// PROPERTY: Topological order puts every dependency before its node.
    #[test]
    fn property_topological_order(g in dag()) {
        let order = topological_order(&g).unwrap();
        let position: BTreeMap<u8, usize> = order.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        for (node, deps) in &g {
            for dep in deps {
                prop_assert!(position[dep] < position[node], "{} before {}", dep, node);
            }
        }
        let again = topological_order(&g).unwrap();
        prop_assert_eq!(order, again);
    }
}
