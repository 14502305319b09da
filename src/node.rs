use std::collections::BTreeSet;
use std::fmt;

use crate::graph::Graph;
use crate::parent_set::{ParentLayout, ParentSet};
use crate::types::TypeTag;

/// Depth is the ordering key of an evaluable node: one more than the largest
/// depth among its evaluable parents, or 0 when it has none.
pub type Depth = u32;

/// NodeId is a stable handle to a node in a [`Graph`].
///
/// The generation distinguishes a live node from an earlier node that
/// occupied the same arena slot, so a handle kept past `Graph::remove` is
/// reported as stale instead of aliasing a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId {
    index: usize,
    generation: u64,
}

impl NodeId {
    pub(crate) const fn new(index: usize, generation: u64) -> Self {
        Self { index, generation }
    }

    /// Arena slot of this node.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Generation of this node.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// A recompute body supplied by the value layer.
///
/// The body reads its parents' current values through [`Inputs`] and returns
/// the node's next value. The engine compares it with the stored value to
/// decide whether the node changed.
pub trait Recompute<V>: 'static {
    /// Produce the next value of the node.
    fn recompute(&mut self, inputs: &Inputs<'_, V>) -> anyhow::Result<V>;
}

impl<V, F> Recompute<V> for F
where
    F: FnMut(&Inputs<'_, V>) -> anyhow::Result<V> + 'static,
{
    fn recompute(&mut self, inputs: &Inputs<'_, V>) -> anyhow::Result<V> {
        self(inputs)
    }
}

/// Read-only view of a node's parent values, in slot order.
pub struct Inputs<'a, V> {
    graph: &'a Graph<V>,
    parents: Option<&'a ParentSet>,
}

impl<'a, V> Inputs<'a, V> {
    pub(crate) fn new(graph: &'a Graph<V>, parents: Option<&'a ParentSet>) -> Self {
        Self { graph, parents }
    }

    /// Number of parent slots, fixed and variable.
    pub fn len(&self) -> usize {
        self.parents.map_or(0, |p| p.len())
    }

    /// Returns true if the node has no parent slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of the parent in slot `index`, or `None` for an empty or missing slot.
    pub fn get(&self, index: usize) -> Option<&'a V> {
        let parent = self.parents?.slot(index)?;
        self.graph.value(parent)
    }

    /// Values of the variable region, in order.
    pub fn variable(&self) -> impl Iterator<Item = &'a V> + '_ {
        let fixed = self.parents.map_or(0, |p| p.fixed_len());
        (fixed..self.len()).filter_map(move |i| self.get(i))
    }

    /// Values of every slot, `None` for empty ones.
    pub fn iter(&self) -> impl Iterator<Item = Option<&'a V>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Capability of a node that can be pointed at. Carries the children that
/// currently point at it.
#[derive(Debug, Clone, Default)]
pub struct ParentFacet {
    children: BTreeSet<NodeId>,
}

impl ParentFacet {
    /// Children registered on this node.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    /// Returns true if `child` is registered on this node.
    pub fn has_child(&self, child: NodeId) -> bool {
        self.children.contains(&child)
    }

    pub(crate) fn register(&mut self, child: NodeId) -> bool {
        self.children.insert(child)
    }

    pub(crate) fn unregister(&mut self, child: NodeId) -> bool {
        self.children.remove(&child)
    }
}

/// Capability of a node that points at others.
#[derive(Debug)]
pub struct ChildFacet {
    pub(crate) parents: ParentSet,
    pub(crate) legitimate: bool,
}

impl ChildFacet {
    /// The node's parent set.
    pub fn parents(&self) -> &ParentSet {
        &self.parents
    }

    /// Returns true once the child is committed to the permanent graph.
    pub fn is_legitimate(&self) -> bool {
        self.legitimate
    }
}

pub(crate) enum Computation<V> {
    /// Host-written value; recompute reports and clears the pending change.
    Input { changed: bool },
    /// Derived value. The body is taken out while it runs.
    Derived(Option<Box<dyn Recompute<V>>>),
}

/// Capability of a node that participates in propagation rounds.
pub struct EvaluableFacet<V> {
    pub(crate) depth: Depth,
    pub(crate) computation: Computation<V>,
}

impl<V> EvaluableFacet<V> {
    /// Depth recorded on the node.
    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// Returns true if the value is written by the host rather than derived.
    pub fn is_input(&self) -> bool {
        matches!(self.computation, Computation::Input { .. })
    }
}

impl<V> fmt::Debug for EvaluableFacet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluableFacet")
            .field("depth", &self.depth)
            .field("input", &self.is_input())
            .finish()
    }
}

/// One-shot boolean capability. The value layer decides how "provoked" is
/// read from and written into a value.
pub struct TriggerFacet<V> {
    is_provoked: fn(&V) -> bool,
    set_provoked: fn(&mut V, bool),
}

impl<V> TriggerFacet<V> {
    /// Create a trigger facet from a read and a write accessor.
    ///
    /// ```
    /// # use blackboard::TriggerFacet;
    /// let facet: TriggerFacet<bool> = TriggerFacet::new(|v| *v, |v, provoked| *v = provoked);
    /// assert!(facet.is_provoked(&true));
    /// ```
    pub fn new(is_provoked: fn(&V) -> bool, set_provoked: fn(&mut V, bool)) -> Self {
        Self {
            is_provoked,
            set_provoked,
        }
    }

    /// Returns true if `value` is provoked.
    pub fn is_provoked(&self, value: &V) -> bool {
        (self.is_provoked)(value)
    }

    pub(crate) fn set(&self, value: &mut V, provoked: bool) {
        (self.set_provoked)(value, provoked)
    }
}

impl<V> fmt::Debug for TriggerFacet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TriggerFacet")
    }
}

/// Callback invoked when an output node's change is flushed.
pub type Observer<V> = Box<dyn FnMut(NodeId, &V) -> anyhow::Result<()>>;

/// Capability of a node whose changes are announced to host observers.
pub struct OutputFacet<V> {
    pub(crate) pending: bool,
    pub(crate) observers: Vec<Observer<V>>,
}

impl<V> OutputFacet<V> {
    /// Returns true if a change has not been flushed yet.
    pub fn has_pending_change(&self) -> bool {
        self.pending
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<V> Default for OutputFacet<V> {
    fn default() -> Self {
        Self {
            pending: false,
            observers: Vec::new(),
        }
    }
}

impl<V> fmt::Debug for OutputFacet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFacet")
            .field("pending", &self.pending)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Node is an identity in the graph. Every behavior comes from its optional facets.
pub struct Node<V> {
    pub(crate) id: NodeId,
    pub(crate) ty: TypeTag,
    pub(crate) label: Option<String>,
    pub(crate) value: V,
    pub(crate) parent: Option<ParentFacet>,
    pub(crate) child: Option<ChildFacet>,
    pub(crate) evaluable: Option<EvaluableFacet<V>>,
    pub(crate) trigger: Option<TriggerFacet<V>>,
    pub(crate) output: Option<OutputFacet<V>>,
}

impl<V> Node<V> {
    /// Handle of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Type tag of the value this node provides.
    pub fn ty(&self) -> TypeTag {
        self.ty
    }

    /// Debug label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Current value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Parent capability, if the node can be pointed at.
    pub fn parent_facet(&self) -> Option<&ParentFacet> {
        self.parent.as_ref()
    }

    /// Child capability, if the node points at others.
    pub fn child_facet(&self) -> Option<&ChildFacet> {
        self.child.as_ref()
    }

    /// Evaluable capability.
    pub fn evaluable(&self) -> Option<&EvaluableFacet<V>> {
        self.evaluable.as_ref()
    }

    /// Trigger capability.
    pub fn trigger(&self) -> Option<&TriggerFacet<V>> {
        self.trigger.as_ref()
    }

    /// Output capability.
    pub fn output(&self) -> Option<&OutputFacet<V>> {
        self.output.as_ref()
    }

    /// The parent set, if the node is a child.
    pub fn parents(&self) -> Option<&ParentSet> {
        self.child.as_ref().map(|c| &c.parents)
    }

    /// Depth, if the node is evaluable.
    pub fn depth(&self) -> Option<Depth> {
        self.evaluable.as_ref().map(|e| e.depth)
    }

    /// Returns true unless the node is a staged child not yet committed.
    pub fn is_legitimate(&self) -> bool {
        self.child.as_ref().map_or(true, |c| c.legitimate)
    }

    /// Returns true if the node is a trigger that is currently provoked.
    pub fn is_provoked(&self) -> bool {
        self.trigger
            .as_ref()
            .is_some_and(|t| t.is_provoked(&self.value))
    }

    /// Returns true if the node is an output with an unflushed change.
    pub fn has_pending_emit(&self) -> bool {
        self.output.as_ref().is_some_and(|o| o.pending)
    }
}

impl<V: fmt::Debug> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("ty", &self.ty)
            .field("label", &self.label)
            .field("value", &self.value)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("evaluable", &self.evaluable)
            .field("trigger", &self.trigger)
            .field("output", &self.output)
            .finish()
    }
}

/// Describes a node before it is added to a [`Graph`].
///
/// # Example
///
/// ```
/// # use blackboard::{Graph, Inputs, NodeBuilder, ParentLayout, TypeTag};
/// const INT: TypeTag = TypeTag::new("int");
///
/// let mut graph = Graph::new();
/// let a = graph.add(NodeBuilder::input(INT, 1i64)).unwrap();
/// let b = graph.add(NodeBuilder::input(INT, 2i64)).unwrap();
/// let sum = graph
///     .add(
///         NodeBuilder::derived(INT, 0i64, ParentLayout::variable(INT, 1, 8), |inputs: &Inputs<i64>| {
///             Ok(inputs.variable().sum())
///         })
///         .parents([Some(a), Some(b)]),
///     )
///     .unwrap();
/// assert_eq!(graph.depth(sum), Some(1));
/// ```
pub struct NodeBuilder<V> {
    pub(crate) ty: TypeTag,
    pub(crate) value: V,
    pub(crate) label: Option<String>,
    pub(crate) parent: bool,
    pub(crate) layout: Option<ParentLayout>,
    pub(crate) parents: Vec<Option<NodeId>>,
    pub(crate) computation: Option<Computation<V>>,
    pub(crate) trigger: Option<TriggerFacet<V>>,
    pub(crate) output: bool,
    pub(crate) legitimate: bool,
}

impl<V> NodeBuilder<V> {
    fn base(ty: TypeTag, value: V) -> Self {
        Self {
            ty,
            value,
            label: None,
            parent: true,
            layout: None,
            parents: Vec::new(),
            computation: None,
            trigger: None,
            output: false,
            legitimate: true,
        }
    }

    /// A host-written, evaluable node with no parents.
    pub fn input(ty: TypeTag, value: V) -> Self {
        Self {
            computation: Some(Computation::Input { changed: false }),
            ..Self::base(ty, value)
        }
    }

    /// A fixed value that never takes part in propagation.
    pub fn constant(ty: TypeTag, value: V) -> Self {
        Self::base(ty, value)
    }

    /// A derived node computed from its parents by `body`.
    pub fn derived<F>(ty: TypeTag, initial: V, layout: ParentLayout, body: F) -> Self
    where
        F: FnMut(&Inputs<'_, V>) -> anyhow::Result<V> + 'static,
    {
        Self::derived_with(ty, initial, layout, body)
    }

    /// A derived node computed by any [`Recompute`] implementation.
    pub fn derived_with(
        ty: TypeTag,
        initial: V,
        layout: ParentLayout,
        body: impl Recompute<V>,
    ) -> Self {
        Self {
            layout: Some(layout),
            computation: Some(Computation::Derived(Some(Box::new(body)))),
            ..Self::base(ty, initial)
        }
    }

    /// A child that points at parents but is never evaluated.
    pub fn child(ty: TypeTag, value: V, layout: ParentLayout) -> Self {
        Self {
            layout: Some(layout),
            ..Self::base(ty, value)
        }
    }

    /// Attach a debug label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Initial parents, assigned with `set_all` semantics when the node is added.
    pub fn parents(mut self, parents: impl IntoIterator<Item = Option<NodeId>>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }

    /// Make the node a trigger.
    pub fn trigger(mut self, facet: TriggerFacet<V>) -> Self {
        self.trigger = Some(facet);
        self
    }

    /// Make the node an output.
    pub fn output(mut self) -> Self {
        self.output = true;
        self
    }

    /// Add the node as illegitimate: its parents will not list it until it
    /// is committed with `Graph::legitimize`.
    pub fn staged(mut self) -> Self {
        self.legitimate = false;
        self
    }

    /// Drop the parent capability; nothing may point at the node.
    pub fn without_parent_facet(mut self) -> Self {
        self.parent = false;
        self
    }
}
