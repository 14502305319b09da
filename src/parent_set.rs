//! Parent bookkeeping for child nodes.
//!
//! A [`ParentSet`] is an ordered sequence of fixed, individually typed slots
//! followed by an optional variable region of one shared type. The set itself
//! is plain data; [`ParentSetMut`] performs edits against the owning [`Graph`]
//! so that every parent's child set stays in agreement with its children.

use std::collections::BTreeSet;

use crate::error::{Operation, StructuralError};
use crate::graph::Graph;
use crate::node::NodeId;
use crate::types::{SlotType, TypeTag};

/// Declared bounds and type of the variable region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLayout {
    /// Type shared by every variable slot.
    pub ty: SlotType,
    /// Minimum number of variable parents.
    pub min: usize,
    /// Maximum number of variable parents.
    pub max: usize,
}

/// Shape of a parent set: fixed slot types and an optional variable region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentLayout {
    fixed: Vec<SlotType>,
    variable: Option<VariableLayout>,
}

impl ParentLayout {
    /// A layout with no slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// A layout with only fixed slots.
    pub fn fixed<T: Into<SlotType>>(types: impl IntoIterator<Item = T>) -> Self {
        Self {
            fixed: types.into_iter().map(Into::into).collect(),
            variable: None,
        }
    }

    /// A layout with only a variable region.
    pub fn variable(ty: impl Into<SlotType>, min: usize, max: usize) -> Self {
        Self::new().with_variable(ty, min, max)
    }

    /// Append one fixed slot.
    pub fn with_fixed(mut self, ty: impl Into<SlotType>) -> Self {
        self.fixed.push(ty.into());
        self
    }

    /// Set the variable region. `max` is raised to `min` if smaller.
    pub fn with_variable(mut self, ty: impl Into<SlotType>, min: usize, max: usize) -> Self {
        self.variable = Some(VariableLayout {
            ty: ty.into(),
            min,
            max: max.max(min),
        });
        self
    }
}

#[derive(Debug, Clone)]
struct FixedSlots {
    types: Vec<SlotType>,
    slots: Vec<Option<NodeId>>,
}

impl FixedSlots {
    fn new(types: Vec<SlotType>) -> Self {
        let slots = vec![None; types.len()];
        Self { types, slots }
    }

    fn check(
        &self,
        op: Operation,
        index: usize,
        candidate: Option<(NodeId, TypeTag)>,
    ) -> Result<(), StructuralError> {
        let expected = &self.types[index];
        match candidate {
            None => Ok(()),
            Some((_, tag)) if expected.accepts(tag) => Ok(()),
            Some((node, tag)) => Err(StructuralError::TypeMismatch {
                op,
                index,
                expected: expected.clone(),
                actual: Some(tag),
                node: Some(node),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct VariableSlots {
    layout: VariableLayout,
    slots: Vec<NodeId>,
}

impl VariableSlots {
    fn check(
        &self,
        op: Operation,
        index: usize,
        candidate: Option<(NodeId, TypeTag)>,
    ) -> Result<(), StructuralError> {
        match candidate {
            Some((_, tag)) if self.layout.ty.accepts(tag) => Ok(()),
            other => Err(StructuralError::TypeMismatch {
                op,
                index,
                expected: self.layout.ty.clone(),
                actual: other.map(|(_, tag)| tag),
                node: other.map(|(node, _)| node),
            }),
        }
    }
}

/// The parents of one child: fixed slots followed by the variable region.
#[derive(Debug, Clone)]
pub struct ParentSet {
    fixed: FixedSlots,
    variable: Option<VariableSlots>,
}

impl ParentSet {
    /// Create an empty parent set: every fixed slot empty, no variable parents.
    pub fn new(layout: ParentLayout) -> Self {
        Self {
            fixed: FixedSlots::new(layout.fixed),
            variable: layout.variable.map(|layout| VariableSlots {
                layout,
                slots: Vec::new(),
            }),
        }
    }

    /// Total number of slots, fixed and variable.
    pub fn len(&self) -> usize {
        self.fixed_len() + self.variable_len()
    }

    /// Returns true if the set has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fixed slots.
    pub fn fixed_len(&self) -> usize {
        self.fixed.slots.len()
    }

    /// Number of parents in the variable region.
    pub fn variable_len(&self) -> usize {
        self.variable.as_ref().map_or(0, |v| v.slots.len())
    }

    /// Bounds and type of the variable region, if there is one.
    pub fn variable_layout(&self) -> Option<&VariableLayout> {
        self.variable.as_ref().map(|v| &v.layout)
    }

    /// Declared type of slot `index`. Indices past the end resolve to the
    /// variable type when there is a variable region.
    pub fn slot_type(&self, index: usize) -> Option<&SlotType> {
        if index < self.fixed_len() {
            Some(&self.fixed.types[index])
        } else {
            self.variable_layout().map(|v| &v.ty)
        }
    }

    /// Bounds-checked read of slot `index`.
    pub fn get(&self, index: usize) -> Result<Option<NodeId>, StructuralError> {
        if index >= self.len() {
            return Err(StructuralError::IndexOutOfRange {
                op: Operation::Get,
                index,
                len: self.len(),
            });
        }
        Ok(self.slot(index))
    }

    /// Every slot in order, `None` for empty fixed slots.
    pub fn iter(&self) -> impl Iterator<Item = Option<NodeId>> + '_ {
        let variable = self.variable.iter().flat_map(|v| v.slots.iter().copied().map(Some));
        self.fixed.slots.iter().copied().chain(variable)
    }

    /// Every occupied slot's parent in order, duplicates included.
    pub fn occupied(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().flatten()
    }

    /// Distinct parents.
    pub fn distinct(&self) -> BTreeSet<NodeId> {
        self.occupied().collect()
    }

    /// Returns true if `parent` occupies any slot.
    pub fn contains(&self, parent: NodeId) -> bool {
        self.occupied().any(|p| p == parent)
    }

    /// Number of slots holding `parent`.
    pub fn occurrences(&self, parent: NodeId) -> usize {
        self.occupied().filter(|p| *p == parent).count()
    }

    pub(crate) fn slot(&self, index: usize) -> Option<NodeId> {
        let fixed = self.fixed_len();
        if index < fixed {
            self.fixed.slots[index]
        } else {
            self.variable
                .as_ref()
                .and_then(|v| v.slots.get(index - fixed).copied())
        }
    }

    /// Type-check `candidate` against slot `index` without bounds checking the
    /// variable region, so positions about to be inserted can be validated.
    pub(crate) fn check_slot(
        &self,
        op: Operation,
        index: usize,
        candidate: Option<(NodeId, TypeTag)>,
    ) -> Result<(), StructuralError> {
        if index < self.fixed_len() {
            return self.fixed.check(op, index, candidate);
        }
        match &self.variable {
            Some(variable) => variable.check(op, index, candidate),
            None => Err(StructuralError::IndexOutOfRange {
                op,
                index,
                len: self.len(),
            }),
        }
    }

    pub(crate) fn put(&mut self, index: usize, parent: Option<NodeId>) -> Option<NodeId> {
        let fixed = self.fixed_len();
        if index < fixed {
            return std::mem::replace(&mut self.fixed.slots[index], parent);
        }
        match (&mut self.variable, parent) {
            (Some(variable), Some(parent)) => variable
                .slots
                .get_mut(index - fixed)
                .map(|slot| std::mem::replace(slot, parent)),
            _ => None,
        }
    }

    pub(crate) fn assign(&mut self, parents: &[Option<NodeId>]) {
        let fixed = self.fixed_len();
        self.fixed.slots.copy_from_slice(&parents[..fixed]);
        if let Some(variable) = &mut self.variable {
            variable.slots = parents[fixed..].iter().flatten().copied().collect();
        }
    }

    pub(crate) fn splice_in(&mut self, index: usize, parents: &[NodeId]) {
        let fixed = self.fixed_len();
        if let Some(variable) = &mut self.variable {
            let at = index - fixed;
            variable.slots.splice(at..at, parents.iter().copied());
        }
    }

    pub(crate) fn drain(&mut self, index: usize, count: usize) -> Vec<NodeId> {
        let fixed = self.fixed_len();
        match &mut self.variable {
            Some(variable) => {
                let at = index - fixed;
                variable.slots.drain(at..at + count).collect()
            }
            None => Vec::new(),
        }
    }
}

/// Mutable access to one child's parent set.
///
/// Obtained from [`Graph::parent_set_mut`]. Every mutator validates the whole
/// edit before touching anything, then updates the parent set and the
/// affected parents' child sets. While the child is illegitimate, no parent
/// is registered.
pub struct ParentSetMut<'g, V> {
    graph: &'g mut Graph<V>,
    child: NodeId,
}

impl<'g, V> ParentSetMut<'g, V> {
    pub(crate) fn new(graph: &'g mut Graph<V>, child: NodeId) -> Self {
        Self { graph, child }
    }

    /// The child whose parents are being edited.
    pub fn child(&self) -> NodeId {
        self.child
    }

    /// Read-only view of the current parent set.
    pub fn current(&self) -> Result<&ParentSet, StructuralError> {
        self.graph.parent_set_ref(self.child)
    }

    /// Bounds-checked read of slot `index`.
    pub fn get(&self, index: usize) -> Result<Option<NodeId>, StructuralError> {
        self.current()?.get(index)
    }

    /// Assign slot `index`. Returns false if `parent` is already there.
    pub fn set(&mut self, index: usize, parent: Option<NodeId>) -> Result<bool, StructuralError> {
        let op = Operation::Set;
        let candidate = self.candidate(op, parent)?;
        let set = self.graph.parent_set_ref(self.child)?;
        if index >= set.len() {
            return Err(StructuralError::IndexOutOfRange {
                op,
                index,
                len: set.len(),
            });
        }
        set.check_slot(op, index, candidate)?;
        let old = set.slot(index);
        if old == parent {
            return Ok(false);
        }

        let set = self.graph.parent_set_mut_ref(self.child)?;
        set.put(index, parent);
        let old_remains = old.is_some_and(|o| set.contains(o));

        if self.graph.is_legitimate(self.child) {
            if let Some(old) = old.filter(|_| !old_remains) {
                self.graph.unregister(old, self.child);
            }
            if let Some(parent) = parent {
                self.graph.register(parent, self.child);
            }
        }
        self.graph.note_structural_edit(self.child);
        Ok(true)
    }

    /// Replace every occurrence of `old` with `new`. Type compatibility of
    /// every affected slot is checked before any slot changes.
    pub fn replace_everywhere(&mut self, old: NodeId, new: NodeId) -> Result<bool, StructuralError> {
        let op = Operation::ReplaceEverywhere;
        if old == new {
            return Ok(false);
        }
        let candidate = self.candidate(op, Some(new))?;
        let set = self.graph.parent_set_ref(self.child)?;
        let positions: Vec<usize> = set
            .iter()
            .enumerate()
            .filter(|(_, slot)| *slot == Some(old))
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return Ok(false);
        }
        for &index in &positions {
            set.check_slot(op, index, candidate)?;
        }

        let set = self.graph.parent_set_mut_ref(self.child)?;
        for &index in &positions {
            set.put(index, Some(new));
        }
        if self.graph.is_legitimate(self.child) {
            self.graph.unregister(old, self.child);
            self.graph.register(new, self.child);
        }
        self.graph.note_structural_edit(self.child);
        Ok(true)
    }

    /// Replace the whole parent list.
    ///
    /// Only parents leaving the set are unregistered and only parents
    /// entering it are registered; parents kept across the edit see no
    /// child-set change. Returns false if the list is identical.
    pub fn set_all(&mut self, parents: &[Option<NodeId>]) -> Result<bool, StructuralError> {
        let op = Operation::SetAll;
        let candidates = parents
            .iter()
            .map(|p| self.candidate(op, *p))
            .collect::<Result<Vec<_>, _>>()?;

        let set = self.graph.parent_set_ref(self.child)?;
        let fixed = set.fixed_len();
        let (min, max) = match set.variable_layout() {
            Some(v) => (fixed + v.min, fixed + v.max),
            None => (fixed, fixed),
        };
        if parents.len() < min {
            return Err(StructuralError::BelowMinimum {
                op,
                min,
                requested: parents.len(),
            });
        }
        if parents.len() > max {
            return Err(StructuralError::CapacityExceeded {
                op,
                max,
                requested: parents.len(),
            });
        }
        for (index, candidate) in candidates.into_iter().enumerate() {
            set.check_slot(op, index, candidate)?;
        }
        if set.iter().eq(parents.iter().copied()) {
            return Ok(false);
        }

        let before = set.distinct();
        let set = self.graph.parent_set_mut_ref(self.child)?;
        set.assign(parents);
        let after = set.distinct();

        if self.graph.is_legitimate(self.child) {
            for &leaving in before.difference(&after) {
                self.graph.unregister(leaving, self.child);
            }
            for &entering in after.difference(&before) {
                self.graph.register(entering, self.child);
            }
        }
        self.graph.note_structural_edit(self.child);
        Ok(true)
    }

    /// Insert `parents` into the variable region before slot `index`.
    ///
    /// With `originating`, a parent currently feeding that child is moved
    /// here: the originating child is unregistered from it. The caller is
    /// then expected to detach or remove the originating child.
    pub fn insert(
        &mut self,
        index: usize,
        parents: &[NodeId],
        originating: Option<NodeId>,
    ) -> Result<(), StructuralError> {
        let op = Operation::Insert;
        let candidates = parents
            .iter()
            .map(|p| self.candidate(op, Some(*p)))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(origin) = originating {
            self.graph.node(origin)?;
        }

        let set = self.graph.parent_set_ref(self.child)?;
        let Some(variable) = set.variable_layout() else {
            return Err(StructuralError::InvalidOperation {
                op,
                reason: "parent set has no variable region",
            });
        };
        if index < set.fixed_len() {
            return Err(StructuralError::InvalidOperation {
                op,
                reason: "index lies in the fixed region",
            });
        }
        if index > set.len() {
            return Err(StructuralError::IndexOutOfRange {
                op,
                index,
                len: set.len(),
            });
        }
        let requested = set.variable_len() + parents.len();
        if requested > variable.max {
            return Err(StructuralError::CapacityExceeded {
                op,
                max: variable.max,
                requested,
            });
        }
        for (offset, candidate) in candidates.into_iter().enumerate() {
            set.check_slot(op, index + offset, candidate)?;
        }
        if parents.is_empty() {
            return Ok(());
        }

        self.graph
            .parent_set_mut_ref(self.child)?
            .splice_in(index, parents);

        if self.graph.is_legitimate(self.child) {
            let entering: BTreeSet<NodeId> = parents.iter().copied().collect();
            for parent in entering {
                if let Some(origin) = originating.filter(|o| *o != self.child) {
                    if self.graph.is_registered(parent, origin) {
                        self.graph.unregister(parent, origin);
                    }
                }
                self.graph.register(parent, self.child);
            }
        }
        self.graph.note_structural_edit(self.child);
        Ok(())
    }

    /// Remove `count` parents from the variable region starting at slot `index`.
    ///
    /// A removed parent stays registered while another slot still holds it.
    pub fn remove(&mut self, index: usize, count: usize) -> Result<(), StructuralError> {
        let op = Operation::Remove;
        let set = self.graph.parent_set_ref(self.child)?;
        let Some(variable) = set.variable_layout() else {
            return Err(StructuralError::InvalidOperation {
                op,
                reason: "parent set has no variable region",
            });
        };
        if index < set.fixed_len() {
            return Err(StructuralError::InvalidOperation {
                op,
                reason: "index lies in the fixed region",
            });
        }
        match index.checked_add(count) {
            Some(end) if end <= set.len() => {}
            _ => {
                return Err(StructuralError::IndexOutOfRange {
                    op,
                    index,
                    len: set.len(),
                })
            }
        }
        let remaining = set.variable_len() - count;
        if remaining < variable.min {
            return Err(StructuralError::BelowMinimum {
                op,
                min: variable.min,
                requested: remaining,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let set = self.graph.parent_set_mut_ref(self.child)?;
        let removed: BTreeSet<NodeId> = set.drain(index, count).into_iter().collect();
        let leaving: Vec<NodeId> = removed.into_iter().filter(|p| !set.contains(*p)).collect();

        if self.graph.is_legitimate(self.child) {
            for parent in leaving {
                self.graph.unregister(parent, self.child);
            }
        }
        self.graph.note_structural_edit(self.child);
        Ok(())
    }

    fn candidate(
        &self,
        op: Operation,
        parent: Option<NodeId>,
    ) -> Result<Option<(NodeId, TypeTag)>, StructuralError> {
        parent
            .map(|p| self.graph.parent_tag(op, p).map(|tag| (p, tag)))
            .transpose()
    }
}
