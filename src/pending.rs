//! Depth-ordered pending set.
//!
//! [`EvalPending`] holds the evaluable nodes awaiting recomputation in a
//! round, bucketed by the depth each node had when it was inserted. Popping
//! always yields a minimum-depth node, which is what makes propagation
//! glitch-free: by the time a node is recomputed, every parent that could
//! still change in this round already has.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::Error;
use crate::finalization::Finalization;
use crate::graph::Graph;
use crate::node::{Depth, NodeId};

/// Nodes awaiting recomputation, ordered by depth.
#[derive(Debug, Default)]
pub struct EvalPending {
    by_depth: BTreeMap<Depth, VecDeque<NodeId>>,
    members: BTreeSet<NodeId>,
}

impl EvalPending {
    /// Create an empty pending set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending nodes.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns true if `node` is pending.
    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    /// Pending nodes with the depth they are keyed under, shallowest first.
    pub fn iter(&self) -> impl Iterator<Item = (Depth, NodeId)> + '_ {
        self.by_depth
            .iter()
            .flat_map(|(depth, bucket)| bucket.iter().map(move |node| (*depth, *node)))
    }

    /// Drop every pending node.
    pub fn clear(&mut self) {
        self.by_depth.clear();
        self.members.clear();
    }

    /// Insert evaluable nodes keyed by their current depth.
    ///
    /// Nodes already pending keep their position. Stale and non-evaluable
    /// nodes are skipped. Returns the number of nodes actually added.
    pub fn insert<V>(&mut self, graph: &Graph<V>, nodes: impl IntoIterator<Item = NodeId>) -> usize {
        let mut added = 0;
        for node in nodes {
            let Some(depth) = graph.depth(node) else {
                continue;
            };
            if self.push(node, depth) {
                graph.tracer().on_pending_inserted(node, depth);
                added += 1;
            }
        }
        added
    }

    /// Re-key every pending node under its current depth.
    pub fn rekey<V>(&mut self, graph: &Graph<V>) {
        let nodes: Vec<NodeId> = self.iter().map(|(_, node)| node).collect();
        self.clear();
        for node in nodes {
            if let Some(depth) = graph.depth(node) {
                self.push(node, depth);
            }
        }
    }

    /// Repair depths after structural edits.
    ///
    /// Drains the set in depth order, assigning each node its depth computed
    /// from its parents. When a node's depth changes, its evaluable children
    /// are inserted so the change cascades. Returns the number of nodes
    /// whose depth changed.
    pub fn update_depths<V>(&mut self, graph: &mut Graph<V>) -> usize {
        let mut changed = 0;
        while let Some(node) = self.pop() {
            let Some(old) = graph.depth(node) else {
                continue;
            };
            let new = graph.computed_depth(node);
            if new == old {
                continue;
            }
            graph.set_depth(node, new);
            graph.tracer().on_depth_changed(node, old, new);
            changed += 1;
            let children = graph.evaluable_children(node);
            self.insert(graph, children);
        }
        changed
    }

    /// Propagate changes.
    ///
    /// Drains the set in depth order, recomputing each node. When a node
    /// changes, its evaluable children become pending and the node is
    /// offered to `finalization`. A failing recompute aborts immediately;
    /// nodes not yet drained stay pending. Returns the number of nodes
    /// recomputed.
    pub fn evaluate<V: PartialEq + 'static>(
        &mut self,
        graph: &mut Graph<V>,
        finalization: &mut Finalization,
    ) -> Result<usize, Error> {
        let mut recomputed = 0;
        while let Some(node) = self.pop() {
            let changed = graph.recompute(node)?;
            graph.tracer().on_recompute(node, changed);
            recomputed += 1;
            if changed {
                let children = graph.evaluable_children(node);
                self.insert(graph, children);
                finalization.add(graph, [node]);
            }
        }
        Ok(recomputed)
    }

    fn push(&mut self, node: NodeId, depth: Depth) -> bool {
        if !self.members.insert(node) {
            return false;
        }
        self.by_depth.entry(depth).or_default().push_back(node);
        true
    }

    fn pop(&mut self) -> Option<NodeId> {
        let mut entry = self.by_depth.first_entry()?;
        let node = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        let node = node?;
        self.members.remove(&node);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Inputs, NodeBuilder};
    use crate::parent_set::ParentLayout;
    use crate::types::TypeTag;

    const INT: TypeTag = TypeTag::new("int");

    fn sum(graph: &mut Graph<i64>, parents: &[NodeId]) -> NodeId {
        graph
            .add(
                NodeBuilder::derived(INT, 0, ParentLayout::variable(INT, 0, 8), |i: &Inputs<i64>| {
                    Ok(i.variable().sum())
                })
                .parents(parents.iter().copied().map(Some)),
            )
            .unwrap()
    }

    #[test]
    fn test_insert_is_idempotent_and_skips_non_evaluable() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let k = graph.add(NodeBuilder::constant(INT, 7)).unwrap();
        let s = sum(&mut graph, &[a]);

        let mut pending = EvalPending::new();
        assert_eq!(pending.insert(&graph, [s, a, k]), 2);
        assert_eq!(pending.insert(&graph, [a, s]), 0);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.iter().collect::<Vec<_>>(), vec![(0, a), (1, s)]);
        assert!(!pending.contains(k));
    }

    #[test]
    fn test_pop_yields_minimum_depth_first() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let b = sum(&mut graph, &[a]);
        let c = sum(&mut graph, &[b]);

        let mut pending = EvalPending::new();
        pending.insert(&graph, [c, b, a]);
        assert_eq!(pending.pop(), Some(a));
        assert_eq!(pending.pop(), Some(b));
        assert_eq!(pending.pop(), Some(c));
        assert_eq!(pending.pop(), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_update_depths_cascades_to_children() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let x = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let b = sum(&mut graph, &[x]);
        let c = sum(&mut graph, &[b]);
        let d = sum(&mut graph, &[a]);
        assert_eq!(graph.depth(c), Some(2));
        assert_eq!(graph.depth(d), Some(1));

        graph.parent_set_mut(d).unwrap().insert(1, &[c], None).unwrap();
        assert_eq!(graph.depth(d), Some(1));

        let mut pending = EvalPending::new();
        pending.insert(&graph, [d]);
        assert_eq!(pending.update_depths(&mut graph), 1);
        assert_eq!(graph.depth(d), Some(3));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_rekey_follows_current_depth() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let b = sum(&mut graph, &[a]);
        let c = sum(&mut graph, &[]);

        let mut pending = EvalPending::new();
        pending.insert(&graph, [c]);
        graph.parent_set_mut(c).unwrap().insert(0, &[b], None).unwrap();
        let depth = graph.computed_depth(c);
        graph.set_depth(c, depth);

        assert_eq!(pending.iter().collect::<Vec<_>>(), vec![(0, c)]);
        pending.rekey(&graph);
        assert_eq!(pending.iter().collect::<Vec<_>>(), vec![(2, c)]);
    }

    #[test]
    fn test_evaluate_propagates_in_depth_order() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let b = sum(&mut graph, &[a]);
        let c = sum(&mut graph, &[a, b]);

        let mut pending = EvalPending::new();
        let mut finalization = Finalization::new();
        pending.insert(&graph, [b, c]);
        assert_eq!(pending.evaluate(&mut graph, &mut finalization).unwrap(), 2);
        assert_eq!(graph.value(c), Some(&2));

        graph.set_value(a, 5).unwrap();
        pending.insert(&graph, [a]);
        assert_eq!(pending.evaluate(&mut graph, &mut finalization).unwrap(), 3);
        assert_eq!(graph.value(b), Some(&5));
        assert_eq!(graph.value(c), Some(&10));
    }
}
