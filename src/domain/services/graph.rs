//! Depth-first traversal with tri-color marking.
//!
//! One walker serves composite-type registration, template chains,
//! dependency closures and artifact ordering. Nodes are visited in the
//! order the successor function yields them, so callers that need
//! deterministic output hand it sorted successors.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    #[default]
    Reject,
    /// Back edges are skipped; the walk still terminates.
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalError<N> {
    /// `path` starts and ends with the node that closed the cycle.
    Cycle { path: Vec<N> },
    /// `path` runs from the root to the first node beyond `limit` hops.
    DepthExceeded { path: Vec<N>, limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

#[derive(Debug)]
pub struct DepthFirst<N> {
    marks: BTreeMap<N, Mark>,
    stack: Vec<N>,
    order: Vec<N>,
    policy: CyclePolicy,
    max_depth: Option<usize>,
}

impl<N: Ord + Clone> Default for DepthFirst<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Ord + Clone> DepthFirst<N> {
    pub fn new() -> Self {
        Self {
            marks: BTreeMap::new(),
            stack: Vec::new(),
            order: Vec::new(),
            policy: CyclePolicy::Reject,
            max_depth: None,
        }
    }

    pub fn with_policy(mut self, policy: CyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Maximum number of hops from a root.
    pub fn with_max_depth(mut self, limit: usize) -> Self {
        self.max_depth = Some(limit);
        self
    }

    pub fn is_visited(&self, node: &N) -> bool {
        self.marks.contains_key(node)
    }

    /// Visit `node` and everything reachable from it.
    pub fn visit<F, I>(&mut self, node: &N, successors: &mut F) -> Result<(), TraversalError<N>>
    where
        F: FnMut(&N) -> I,
        I: IntoIterator<Item = N>,
    {
        match self.marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return match self.policy {
                    CyclePolicy::Allow => Ok(()),
                    CyclePolicy::Reject => Err(TraversalError::Cycle {
                        path: self.cycle_path(node),
                    }),
                };
            }
            None => {}
        }

        if let Some(limit) = self.max_depth {
            if self.stack.len() > limit {
                let mut path = self.stack.clone();
                path.push(node.clone());
                return Err(TraversalError::DepthExceeded { path, limit });
            }
        }

        self.marks.insert(node.clone(), Mark::InProgress);
        self.stack.push(node.clone());
        let next: Vec<N> = successors(node).into_iter().collect();
        for succ in &next {
            self.visit(succ, successors)?;
        }
        self.stack.pop();
        self.marks.insert(node.clone(), Mark::Done);
        self.order.push(node.clone());
        Ok(())
    }

    /// Nodes in post-order: every node after everything it reaches.
    pub fn finish(self) -> Vec<N> {
        self.order
    }

    fn cycle_path(&self, node: &N) -> Vec<N> {
        let start = self.stack.iter().position(|n| n == node).unwrap_or(0);
        let mut path: Vec<N> = self.stack[start..].to_vec();
        path.push(node.clone());
        path
    }
}

/// Topological order of an explicit graph: dependencies first, ties by `Ord`.
pub fn topological_order<N: Ord + Clone>(
    edges: &BTreeMap<N, BTreeSet<N>>,
) -> Result<Vec<N>, TraversalError<N>> {
    let mut walk = DepthFirst::new();
    let mut successors = |n: &N| -> Vec<N> {
        edges
            .get(n)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    };
    for node in edges.keys() {
        walk.visit(node, &mut successors)?;
    }
    Ok(walk.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(pairs: &[(&'static str, &[&'static str])]) -> BTreeMap<&'static str, BTreeSet<&'static str>> {
        pairs
            .iter()
            .map(|(n, deps)| (*n, deps.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let g = graph(&[("c", &["a", "b"]), ("b", &["a"]), ("a", &[])]);
        assert_eq!(topological_order(&g).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn topological_order_ties_break_lexically() {
        let g = graph(&[("z", &[]), ("m", &[]), ("a", &[])]);
        assert_eq!(topological_order(&g).unwrap(), vec!["a", "m", "z"]);
    }

    #[test]
    fn cycle_reports_path() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["b"])]);
        assert_eq!(
            topological_order(&g).unwrap_err(),
            TraversalError::Cycle {
                path: vec!["b", "c", "b"]
            }
        );
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        assert!(matches!(
            topological_order(&g),
            Err(TraversalError::Cycle { .. })
        ));
    }

    #[test]
    fn allow_policy_skips_back_edges() {
        let mut walk = DepthFirst::new().with_policy(CyclePolicy::Allow);
        let mut next = |n: &u32| -> Vec<u32> { vec![(n + 1) % 3] };
        walk.visit(&0, &mut next).unwrap();
        assert_eq!(walk.finish(), vec![2, 1, 0]);
    }

    #[test]
    fn depth_limit_counts_hops() {
        let mut chain = |n: &u32| -> Option<u32> { (*n < 3).then_some(n + 1) };

        let mut ok = DepthFirst::new().with_max_depth(3);
        ok.visit(&0, &mut chain).unwrap();
        assert_eq!(ok.finish(), vec![3, 2, 1, 0]);

        let mut short = DepthFirst::new().with_max_depth(2);
        assert_eq!(
            short.visit(&0, &mut chain).unwrap_err(),
            TraversalError::DepthExceeded {
                path: vec![0, 1, 2, 3],
                limit: 2
            }
        );
    }

    #[test]
    fn shared_nodes_are_visited_once() {
        let g = graph(&[("a", &["c"]), ("b", &["c"]), ("c", &[])]);
        assert_eq!(topological_order(&g).unwrap(), vec!["c", "a", "b"]);
    }
}
