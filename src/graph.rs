//! The node arena.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use slab::Slab;

use crate::error::{Error, Operation, StructuralError};
use crate::node::{
    ChildFacet, Computation, Depth, EvaluableFacet, Inputs, Node, NodeBuilder, NodeId,
    OutputFacet, ParentFacet,
};
use crate::parent_set::{ParentSet, ParentSetMut};
use crate::tracer::{NoopTracer, Tracer};
use crate::types::TypeTag;

/// Graph owns every node and is the only place structural edits happen.
///
/// Nodes reference each other by [`NodeId`]; no node owns another. The graph
/// is single-writer: embedding it in a multi-threaded host requires external
/// mutual exclusion for the duration of an edit or a round.
pub struct Graph<V> {
    nodes: Slab<Node<V>>,
    next_generation: u64,
    /// Children whose parent sets changed since the last round took them.
    structural_edits: BTreeSet<NodeId>,
    tracer: Arc<dyn Tracer>,
}

impl<V> Default for Graph<V> {
    fn default() -> Self {
        Self::with_tracer(Arc::new(NoopTracer))
    }
}

impl<V> fmt::Debug for Graph<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("structural_edits", &self.structural_edits)
            .finish()
    }
}

impl<V> Graph<V> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph reporting to `tracer`.
    pub fn with_tracer(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            nodes: Slab::new(),
            next_generation: 0,
            structural_edits: BTreeSet::new(),
            tracer,
        }
    }

    /// Replace the tracer.
    pub fn set_tracer(&mut self, tracer: Arc<dyn Tracer>) {
        self.tracer = tracer;
    }

    pub(crate) fn tracer(&self) -> &dyn Tracer {
        self.tracer.as_ref()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Get a live node.
    pub fn get(&self, id: NodeId) -> Option<&Node<V>> {
        self.nodes.get(id.index()).filter(|node| node.id == id)
    }

    /// Iterate over all live nodes.
    pub fn iter(&self) -> impl Iterator<Item = &Node<V>> + '_ {
        self.nodes.iter().map(|(_, node)| node)
    }

    /// Current value of a node.
    pub fn value(&self, id: NodeId) -> Option<&V> {
        self.get(id).map(|node| &node.value)
    }

    /// Recorded depth of an evaluable node.
    pub fn depth(&self, id: NodeId) -> Option<Depth> {
        self.get(id).and_then(|node| node.depth())
    }

    /// The parent set of a child node.
    pub fn parent_set(&self, id: NodeId) -> Option<&ParentSet> {
        self.get(id).and_then(|node| node.parents())
    }

    /// Children registered on a node.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .and_then(|node| node.parent.as_ref())
            .map(|facet| facet.children().collect())
            .unwrap_or_default()
    }

    /// Children whose parent sets changed since the last settled round.
    pub fn structural_edits(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.structural_edits.iter().copied()
    }

    /// Edit the parents of a child node.
    pub fn parent_set_mut(&mut self, id: NodeId) -> Result<ParentSetMut<'_, V>, StructuralError> {
        self.parent_set_ref(id)?;
        Ok(ParentSetMut::new(self, id))
    }

    /// Add a node.
    ///
    /// Initial parents are assigned with `set_all` semantics; if they are
    /// rejected the node is not added. The node's depth is computed from its
    /// parents, and derived nodes are recorded for recomputation in the next
    /// round.
    pub fn add(&mut self, builder: NodeBuilder<V>) -> Result<NodeId, StructuralError> {
        let NodeBuilder {
            ty,
            value,
            label,
            parent,
            layout,
            parents,
            computation,
            trigger,
            output,
            legitimate,
        } = builder;
        if layout.is_none() && !parents.is_empty() {
            return Err(StructuralError::InvalidOperation {
                op: Operation::SetAll,
                reason: "node has no parent layout",
            });
        }
        let derived = matches!(computation, Some(Computation::Derived(_)));

        self.next_generation += 1;
        let entry = self.nodes.vacant_entry();
        let id = NodeId::new(entry.key(), self.next_generation);
        entry.insert(Node {
            id,
            ty,
            label,
            value,
            parent: parent.then(ParentFacet::default),
            child: layout.map(|layout| ChildFacet {
                parents: ParentSet::new(layout),
                legitimate,
            }),
            evaluable: computation.map(|computation| EvaluableFacet {
                depth: 0,
                computation,
            }),
            trigger,
            output: output.then(OutputFacet::default),
        });
        self.tracer.on_node_added(id);

        if !parents.is_empty() {
            if let Err(err) = self.parent_set_mut(id).and_then(|mut set| set.set_all(&parents)) {
                self.nodes.remove(id.index());
                self.structural_edits.remove(&id);
                self.tracer.on_node_removed(id);
                return Err(err);
            }
        }
        let depth = self.computed_depth(id);
        self.set_depth(id, depth);
        if derived {
            self.structural_edits.insert(id);
        }
        Ok(id)
    }

    /// Remove a node that no child points at, returning its value.
    pub fn remove(&mut self, id: NodeId) -> Result<V, StructuralError> {
        let node = self.node(id)?;
        let children: Vec<NodeId> = node
            .parent
            .as_ref()
            .map(|facet| facet.children().collect())
            .unwrap_or_default();
        if !children.is_empty() {
            return Err(StructuralError::StillReferenced { node: id, children });
        }
        let parents = node.parents().map(ParentSet::distinct).unwrap_or_default();
        if node.is_legitimate() {
            for parent in parents {
                self.unregister(parent, id);
            }
        }
        self.structural_edits.remove(&id);
        let node = self.nodes.remove(id.index());
        self.tracer.on_node_removed(id);
        Ok(node.value)
    }

    /// Commit a staged child to the permanent graph, registering it with
    /// every current parent. Returns false if it was already legitimate.
    pub fn legitimize(&mut self, id: NodeId) -> Result<bool, StructuralError> {
        let set = self.parent_set_ref(id)?;
        if self.is_legitimate(id) {
            return Ok(false);
        }
        let parents = set.distinct();
        for &parent in &parents {
            self.parent_tag(Operation::Legitimize, parent)?;
        }

        if let Some(child) = self.node_mut(id)?.child.as_mut() {
            child.legitimate = true;
        }
        for parent in parents {
            self.register(parent, id);
        }
        self.note_structural_edit(id);
        self.tracer.on_legitimized(id);
        Ok(true)
    }

    /// Provoke a host-written trigger. Returns false if it was already provoked.
    pub fn provoke(&mut self, id: NodeId) -> Result<bool, StructuralError> {
        let op = Operation::Provoke;
        let node = self.node_mut(id)?;
        let Some(trigger) = node.trigger.as_ref() else {
            return Err(StructuralError::InvalidOperation {
                op,
                reason: "node is not a trigger",
            });
        };
        let Some(EvaluableFacet {
            computation: Computation::Input { changed },
            ..
        }) = node.evaluable.as_mut()
        else {
            return Err(StructuralError::InvalidOperation {
                op,
                reason: "trigger is not host-writable",
            });
        };
        if trigger.is_provoked(&node.value) {
            return Ok(false);
        }
        trigger.set(&mut node.value, true);
        *changed = true;
        if let Some(output) = node.output.as_mut() {
            output.pending = true;
        }
        Ok(true)
    }

    /// Register an observer on an output node.
    pub fn observe<F>(&mut self, id: NodeId, observer: F) -> Result<(), StructuralError>
    where
        F: FnMut(NodeId, &V) -> anyhow::Result<()> + 'static,
    {
        let Some(output) = self.node_mut(id)?.output.as_mut() else {
            return Err(StructuralError::InvalidOperation {
                op: Operation::Observe,
                reason: "node is not an output",
            });
        };
        output.observers.push(Box::new(observer));
        Ok(())
    }

    /// `1 + max(depth(p))` over the evaluable parents, or 0 if there are none.
    pub fn computed_depth(&self, id: NodeId) -> Depth {
        self.parent_set(id)
            .and_then(|set| set.occupied().filter_map(|p| self.depth(p)).max())
            .map_or(0, |max| max + 1)
    }

    pub(crate) fn set_depth(&mut self, id: NodeId, depth: Depth) -> Option<Depth> {
        let evaluable = self.node_mut(id).ok()?.evaluable.as_mut()?;
        Some(std::mem::replace(&mut evaluable.depth, depth))
    }

    pub(crate) fn evaluable_children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .and_then(|node| node.parent.as_ref())
            .map(|facet| {
                facet
                    .children()
                    .filter(|child| self.get(*child).is_some_and(|n| n.evaluable.is_some()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reset a provoked trigger without recomputing anything.
    pub(crate) fn reset_trigger(&mut self, id: NodeId) -> bool {
        let Ok(node) = self.node_mut(id) else {
            return false;
        };
        let Some(trigger) = node.trigger.as_ref() else {
            return false;
        };
        if !trigger.is_provoked(&node.value) {
            return false;
        }
        trigger.set(&mut node.value, false);
        self.tracer.on_trigger_reset(id);
        true
    }

    /// Notify an output's observers and clear its pending change.
    pub(crate) fn emit(&mut self, id: NodeId) -> Result<bool, Error> {
        let Ok(node) = self.node_mut(id) else {
            return Ok(false);
        };
        let Some(output) = node.output.as_mut() else {
            return Ok(false);
        };
        output.pending = false;
        let mut observers = std::mem::take(&mut output.observers);
        let result = observers
            .iter_mut()
            .try_for_each(|observer| observer(id, &node.value));
        if let Some(output) = node.output.as_mut() {
            output.observers = observers;
        }
        result.map_err(|error| Error::Observer {
            node: id,
            error: Arc::new(error),
        })?;
        self.tracer.on_output_emitted(id);
        Ok(true)
    }

    pub(crate) fn take_structural_edits(&mut self) -> BTreeSet<NodeId> {
        std::mem::take(&mut self.structural_edits)
    }

    pub(crate) fn note_structural_edit(&mut self, id: NodeId) {
        self.structural_edits.insert(id);
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node<V>, StructuralError> {
        self.get(id).ok_or(StructuralError::StaleNode { node: id })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<V>, StructuralError> {
        match self.nodes.get_mut(id.index()) {
            Some(node) if node.id == id => Ok(node),
            _ => Err(StructuralError::StaleNode { node: id }),
        }
    }

    pub(crate) fn parent_set_ref(&self, id: NodeId) -> Result<&ParentSet, StructuralError> {
        self.node(id)?
            .parents()
            .ok_or(StructuralError::NotAChild { node: id })
    }

    pub(crate) fn parent_set_mut_ref(
        &mut self,
        id: NodeId,
    ) -> Result<&mut ParentSet, StructuralError> {
        self.node_mut(id)?
            .child
            .as_mut()
            .map(|child| &mut child.parents)
            .ok_or(StructuralError::NotAChild { node: id })
    }

    /// Type tag of a node that may be used as a parent.
    pub(crate) fn parent_tag(&self, op: Operation, id: NodeId) -> Result<TypeTag, StructuralError> {
        let node = self.node(id)?;
        if node.parent.is_none() {
            return Err(StructuralError::NotAParent { op, node: id });
        }
        Ok(node.ty)
    }

    pub(crate) fn is_legitimate(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|node| node.is_legitimate())
    }

    pub(crate) fn is_registered(&self, parent: NodeId, child: NodeId) -> bool {
        self.get(parent)
            .and_then(|node| node.parent.as_ref())
            .is_some_and(|facet| facet.has_child(child))
    }

    pub(crate) fn register(&mut self, parent: NodeId, child: NodeId) {
        let added = self
            .node_mut(parent)
            .ok()
            .and_then(|node| node.parent.as_mut())
            .is_some_and(|facet| facet.register(child));
        if added {
            self.tracer.on_child_added(parent, child);
        }
    }

    pub(crate) fn unregister(&mut self, parent: NodeId, child: NodeId) {
        let removed = self
            .node_mut(parent)
            .ok()
            .and_then(|node| node.parent.as_mut())
            .is_some_and(|facet| facet.unregister(child));
        if removed {
            self.tracer.on_child_removed(parent, child);
        }
    }
}

impl<V: PartialEq + 'static> Graph<V> {
    /// Write a host value into an input node.
    ///
    /// Returns false if the value is equal to the current one. A changed
    /// value is reported by the node's next recompute.
    pub fn set_value(&mut self, id: NodeId, value: V) -> Result<bool, StructuralError> {
        let node = self.node_mut(id)?;
        let Some(EvaluableFacet {
            computation: Computation::Input { changed },
            ..
        }) = node.evaluable.as_mut()
        else {
            return Err(StructuralError::InvalidOperation {
                op: Operation::SetValue,
                reason: "node is not an input",
            });
        };
        if node.value == value {
            return Ok(false);
        }
        node.value = value;
        *changed = true;
        if let Some(output) = node.output.as_mut() {
            output.pending = true;
        }
        Ok(true)
    }

    /// Recompute one node and report whether its value changed.
    ///
    /// Inputs report (and clear) the change recorded by `set_value` or
    /// `provoke`; derived nodes run their body against their parents'
    /// current values. Non-evaluable nodes never change.
    pub fn recompute(&mut self, id: NodeId) -> Result<bool, Error> {
        let node = self.node_mut(id)?;
        let body = match node.evaluable.as_mut().map(|e| &mut e.computation) {
            None => return Ok(false),
            Some(Computation::Input { changed }) => return Ok(std::mem::take(changed)),
            Some(Computation::Derived(body)) => body.take(),
        };
        let Some(mut body) = body else {
            return Ok(false);
        };

        let result = {
            let node = self.node(id)?;
            body.recompute(&Inputs::new(self, node.parents()))
        };
        if let Some(EvaluableFacet {
            computation: Computation::Derived(slot),
            ..
        }) = self.node_mut(id)?.evaluable.as_mut()
        {
            *slot = Some(body);
        }

        match result {
            Ok(value) => Ok(self.store(id, value)),
            Err(error) => {
                self.tracer.on_recompute_failed(id, &error);
                Err(Error::Recompute {
                    node: id,
                    error: Arc::new(error),
                })
            }
        }
    }

    fn store(&mut self, id: NodeId, value: V) -> bool {
        let Ok(node) = self.node_mut(id) else {
            return false;
        };
        if node.value == value {
            return false;
        }
        node.value = value;
        if let Some(output) = node.output.as_mut() {
            output.pending = true;
        }
        true
    }
}
