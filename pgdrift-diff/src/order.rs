//! Dependency ordering.
//!
//! Objects in one batch are ordered with an explicit-stack depth-first
//! traversal over their reference sets. An object is emitted only after
//! everything it references. When two objects reference each other, the
//! edge that closes the cycle is ignored and reported; the resulting order
//! between the cycle's members is arbitrary.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use crate::error::{DiffError, DiffResult};

/// Result of ordering a reference graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOrder<K> {
    /// Every node, dependencies before dependents.
    pub order: Vec<K>,
    /// Edges `(from, to)` ignored to break a cycle.
    pub broken_cycles: Vec<(K, K)>,
}

impl<K> DependencyOrder<K> {
    /// Check if the graph was acyclic.
    pub fn is_acyclic(&self) -> bool {
        self.broken_cycles.is_empty()
    }
}

impl<K: Display> DependencyOrder<K> {
    /// Report broken cycles: a warning each, or an error when `strict`.
    pub fn check_cycles(&self, kind: &str, strict: bool) -> DiffResult<Vec<String>> {
        if strict {
            if let Some((from, to)) = self.broken_cycles.first() {
                return Err(DiffError::dependency_cycle(
                    kind,
                    vec![from.to_string(), to.to_string()],
                ));
            }
        }

        Ok(self
            .broken_cycles
            .iter()
            .map(|(from, to)| {
                warn!(kind, from = %from, to = %to, "Breaking dependency cycle");
                format!(
                    "{} {} and {} reference each other; their relative order is arbitrary",
                    kind, from, to
                )
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

enum Frame<'a, K> {
    Enter { node: &'a K, parent: Option<&'a K> },
    Exit(&'a K),
}

/// Order the nodes of `graph` so that every node follows the nodes it references.
///
/// References to keys outside the graph and self-references are ignored.
/// Roots are visited in the graph's insertion order, so the result is
/// deterministic.
pub fn dependencies_first<K>(graph: &IndexMap<K, IndexSet<K>>) -> DependencyOrder<K>
where
    K: Clone + Eq + Hash,
{
    let mut marks: HashMap<&K, Mark> = HashMap::with_capacity(graph.len());
    let mut order = Vec::with_capacity(graph.len());
    let mut broken_cycles = Vec::new();
    let mut stack = Vec::new();

    for root in graph.keys() {
        if marks.contains_key(root) {
            continue;
        }
        stack.push(Frame::Enter {
            node: root,
            parent: None,
        });

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter { node, parent } => match marks.get(node) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        if let Some(parent) = parent {
                            broken_cycles.push((parent.clone(), node.clone()));
                        }
                    }
                    None => {
                        marks.insert(node, Mark::InProgress);
                        stack.push(Frame::Exit(node));
                        if let Some(references) = graph.get(node) {
                            for reference in references.iter().rev() {
                                if reference == node {
                                    continue;
                                }
                                if let Some((key, _)) = graph.get_key_value(reference) {
                                    stack.push(Frame::Enter {
                                        node: key,
                                        parent: Some(node),
                                    });
                                }
                            }
                        }
                    }
                },
                Frame::Exit(node) => {
                    marks.insert(node, Mark::Done);
                    order.push(node.clone());
                }
            }
        }
    }

    DependencyOrder {
        order,
        broken_cycles,
    }
}

/// Order the nodes of `graph` so that every node precedes the nodes it references.
pub fn dependents_first<K>(graph: &IndexMap<K, IndexSet<K>>) -> DependencyOrder<K>
where
    K: Clone + Eq + Hash,
{
    let mut result = dependencies_first(graph);
    result.order.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(
        edges: &[(&'static str, &[&'static str])],
    ) -> IndexMap<&'static str, IndexSet<&'static str>> {
        edges
            .iter()
            .map(|(node, refs)| (*node, refs.iter().copied().collect()))
            .collect()
    }

    fn position(order: &[&str], node: &str) -> usize {
        order.iter().position(|n| *n == node).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[]), ("d", &["a", "c"])]);
        let result = dependencies_first(&g);

        assert_eq!(result.order, vec!["c", "b", "a", "d"]);
        assert!(result.is_acyclic());
    }

    #[test]
    fn test_every_node_emitted_once() {
        let g = graph(&[("x", &["z"]), ("y", &["z"]), ("z", &[])]);
        let result = dependencies_first(&g);
        assert_eq!(result.order.len(), 3);
        assert!(position(&result.order, "z") < position(&result.order, "x"));
        assert!(position(&result.order, "z") < position(&result.order, "y"));
    }

    #[test]
    fn test_unknown_and_self_references_ignored() {
        let g = graph(&[("a", &["a", "outside"]), ("b", &["a"])]);
        let result = dependencies_first(&g);
        assert_eq!(result.order, vec!["a", "b"]);
        assert!(result.is_acyclic());
    }

    #[test]
    fn test_dependents_first_reverses() {
        let g = graph(&[("a", &["b"]), ("b", &[])]);
        assert_eq!(dependents_first(&g).order, vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_is_broken_and_reported() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let result = dependencies_first(&g);

        assert_eq!(result.order, vec!["b", "a"]);
        assert_eq!(result.broken_cycles, vec![("b", "a")]);

        let warnings = result.check_cycles("views", false).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("b and a"));

        let err = result.check_cycles("views", true).unwrap_err();
        assert!(matches!(err, DiffError::DependencyCycle { .. }));
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let names: Vec<String> = (0..10_000).map(|i| format!("n{}", i)).collect();
        let mut g: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for (i, name) in names.iter().enumerate() {
            let refs = names.get(i + 1).cloned().into_iter().collect();
            g.insert(name.clone(), refs);
        }

        let result = dependencies_first(&g);
        assert_eq!(result.order.first().map(String::as_str), Some("n9999"));
        assert_eq!(result.order.last().map(String::as_str), Some("n0"));
    }
}
