//! Two-phase construction of child nodes.
//!
//! A host that builds several nodes at once (a compiler lowering a
//! definition, for instance) often refers to parents that do not exist yet.
//! [`Staging`] adds such nodes as illegitimate, keeps their parent
//! references aside, and on [`Staging::commit`] resolves every reference,
//! assigns the parent lists and legitimizes the nodes. Nothing becomes
//! visible to any parent's child set before the commit.

use crate::error::{Operation, StructuralError};
use crate::graph::Graph;
use crate::node::{NodeBuilder, NodeId};

/// A named parent that will be resolved at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingRef {
    /// Name the resolver looks up.
    pub name: String,
    /// Node the name is resolved relative to, if any.
    pub receiver: Option<NodeId>,
}

/// A parent reference held by a staged node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentRef {
    /// An existing node.
    Real(NodeId),
    /// A node named but not resolved yet.
    Pending(PendingRef),
}

impl ParentRef {
    /// A pending reference to `name`.
    pub fn pending(name: impl Into<String>) -> Self {
        ParentRef::Pending(PendingRef {
            name: name.into(),
            receiver: None,
        })
    }

    /// A pending reference to `name` as seen from `receiver`.
    pub fn pending_on(receiver: NodeId, name: impl Into<String>) -> Self {
        ParentRef::Pending(PendingRef {
            name: name.into(),
            receiver: Some(receiver),
        })
    }

    /// Resolve to a node handle.
    pub fn resolve<R>(&self, resolver: &mut R) -> Result<NodeId, StructuralError>
    where
        R: FnMut(&PendingRef) -> Option<NodeId>,
    {
        match self {
            ParentRef::Real(node) => Ok(*node),
            ParentRef::Pending(pending) => {
                resolver(pending).ok_or_else(|| StructuralError::Unresolved {
                    name: pending.name.clone(),
                })
            }
        }
    }
}

impl From<NodeId> for ParentRef {
    fn from(node: NodeId) -> Self {
        ParentRef::Real(node)
    }
}

/// Nodes added as illegitimate, waiting for their parents to be resolved.
#[derive(Debug, Default)]
pub struct Staging {
    staged: Vec<(NodeId, Vec<Option<ParentRef>>)>,
}

impl Staging {
    /// Create an empty staging area.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged nodes.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Staged nodes in staging order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.staged.iter().map(|(node, _)| *node)
    }

    /// Add `builder` to the graph as an illegitimate node whose parents are
    /// `parents`, to be assigned on commit.
    pub fn stage<V>(
        &mut self,
        graph: &mut Graph<V>,
        builder: NodeBuilder<V>,
        parents: impl IntoIterator<Item = Option<ParentRef>>,
    ) -> Result<NodeId, StructuralError> {
        if builder.layout.is_none() {
            return Err(StructuralError::InvalidOperation {
                op: Operation::Legitimize,
                reason: "only child nodes can be staged",
            });
        }
        let node = graph.add(builder.staged())?;
        self.staged.push((node, parents.into_iter().collect()));
        Ok(node)
    }

    /// Resolve, assign and legitimize every staged node.
    ///
    /// All references are resolved before any node is touched, so an
    /// unresolved name leaves the graph unchanged. If assigning a parent list
    /// fails, lists already assigned stay assigned but every node stays
    /// staged, and the commit can be retried. Returns the committed nodes.
    pub fn commit<V, R>(
        &mut self,
        graph: &mut Graph<V>,
        mut resolver: R,
    ) -> Result<Vec<NodeId>, StructuralError>
    where
        R: FnMut(&PendingRef) -> Option<NodeId>,
    {
        let resolved = self
            .staged
            .iter()
            .map(|(node, refs)| -> Result<_, StructuralError> {
                let parents = refs
                    .iter()
                    .map(|r| r.as_ref().map(|r| r.resolve(&mut resolver)).transpose())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((*node, parents))
            })
            .collect::<Result<Vec<_>, StructuralError>>()?;

        for (node, parents) in &resolved {
            graph.parent_set_mut(*node)?.set_all(parents)?;
        }
        for (node, _) in &resolved {
            graph.legitimize(*node)?;
        }
        self.staged.clear();
        Ok(resolved.into_iter().map(|(node, _)| node).collect())
    }

    /// Remove every staged node from the graph. Returns how many were removed.
    pub fn discard<V>(&mut self, graph: &mut Graph<V>) -> usize {
        self.staged
            .drain(..)
            .rev()
            .filter(|(node, _)| graph.remove(*node).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::parent_set::ParentLayout;
    use crate::types::TypeTag;

    const INT: TypeTag = TypeTag::new("int");

    fn child() -> NodeBuilder<i64> {
        NodeBuilder::child(INT, 0, ParentLayout::variable(INT, 0, 4))
    }

    #[test]
    fn test_commit_resolves_and_registers() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let mut staging = Staging::new();
        let x = staging.stage(&mut graph, child(), [Some(ParentRef::Real(a))]).unwrap();
        let y = staging
            .stage(&mut graph, child(), [Some(ParentRef::pending("x")), Some(ParentRef::Real(a))])
            .unwrap();
        assert!(graph.children(a).is_empty());
        assert!(!graph.get(y).unwrap().is_legitimate());

        let names = HashMap::from([("x".to_string(), x)]);
        let committed = staging.commit(&mut graph, |r| names.get(&r.name).copied()).unwrap();

        assert_eq!(committed, vec![x, y]);
        assert!(staging.is_empty());
        assert_eq!(graph.children(a), vec![x, y]);
        assert_eq!(graph.children(x), vec![y]);
        assert_eq!(
            graph.parent_set(y).unwrap().occupied().collect::<Vec<_>>(),
            vec![x, a]
        );
    }

    #[test]
    fn test_unresolved_name_changes_nothing() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let mut staging = Staging::new();
        let x = staging.stage(&mut graph, child(), [Some(ParentRef::Real(a))]).unwrap();
        staging
            .stage(&mut graph, child(), [Some(ParentRef::pending("missing"))])
            .unwrap();

        let err = staging.commit(&mut graph, |_| None).unwrap_err();
        assert_eq!(
            err,
            StructuralError::Unresolved {
                name: "missing".to_string()
            }
        );
        assert_eq!(staging.len(), 2);
        assert!(graph.parent_set(x).unwrap().is_empty());
        assert!(graph.children(a).is_empty());
    }

    #[test]
    fn test_discard_removes_staged_nodes() {
        let mut graph = Graph::new();
        let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
        let mut staging = Staging::new();
        staging.stage(&mut graph, child(), [Some(ParentRef::Real(a))]).unwrap();
        staging.stage(&mut graph, child(), []).unwrap();

        assert_eq!(staging.discard(&mut graph), 2);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_stage_rejects_node_without_parent_set() {
        let mut graph: Graph<i64> = Graph::new();
        let mut staging = Staging::new();
        assert!(staging
            .stage(&mut graph, NodeBuilder::input(INT, 1), [])
            .is_err());
        assert!(graph.is_empty());
    }
}
