//! Error types for structural edits and evaluation rounds.

use std::fmt;
use std::sync::Arc;

use crate::audit::ConsistencyViolation;
use crate::node::NodeId;
use crate::types::{SlotType, TypeTag};

/// The operation that produced a [`StructuralError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Reading a parent slot.
    Get,
    /// Assigning a single parent slot.
    Set,
    /// Replacing every occurrence of one parent with another.
    ReplaceEverywhere,
    /// Replacing the whole parent list.
    SetAll,
    /// Inserting into the variable region.
    Insert,
    /// Removing from the variable region.
    Remove,
    /// Committing a staged child to the permanent graph.
    Legitimize,
    /// Writing a host value into an input node.
    SetValue,
    /// Provoking a trigger.
    Provoke,
    /// Registering an output observer.
    Observe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::ReplaceEverywhere => "replace_everywhere",
            Operation::SetAll => "set_all",
            Operation::Insert => "insert",
            Operation::Remove => "remove",
            Operation::Legitimize => "legitimize",
            Operation::SetValue => "set_value",
            Operation::Provoke => "provoke",
            Operation::Observe => "observe",
        };
        f.write_str(name)
    }
}

fn found(actual: &Option<TypeTag>) -> String {
    match actual {
        Some(tag) => tag.to_string(),
        None => "an empty slot".to_string(),
    }
}

/// Errors raised synchronously by graph edits.
///
/// Every mutator validates before it mutates, so a returned error means the
/// graph is exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    /// The index lies outside the current fixed + variable extent.
    #[error("{op}: index {index} is out of range for {len} parent slot(s)")]
    IndexOutOfRange {
        /// The failing operation.
        op: Operation,
        /// The offending index.
        index: usize,
        /// Number of slots at the time of the call.
        len: usize,
    },

    /// A parent is not assignable to the slot's declared type, or an empty
    /// entry was offered to the variable region.
    #[error("{op}: slot {index} expects {expected}, found {}", found(.actual))]
    TypeMismatch {
        /// The failing operation.
        op: Operation,
        /// The slot being assigned.
        index: usize,
        /// The slot's declared type.
        expected: SlotType,
        /// The offered parent's tag, `None` for an empty entry.
        actual: Option<TypeTag>,
        /// The offered parent.
        node: Option<NodeId>,
    },

    /// The variable region (or the whole list, for `set_all`) would grow past
    /// its maximum.
    #[error("{op}: {requested} parent(s) exceed the maximum of {max}")]
    CapacityExceeded {
        /// The failing operation.
        op: Operation,
        /// The bound that would be exceeded.
        max: usize,
        /// The count the operation would have produced.
        requested: usize,
    },

    /// The variable region (or the whole list, for `set_all`) would shrink
    /// under its minimum.
    #[error("{op}: {requested} parent(s) fall below the minimum of {min}")]
    BelowMinimum {
        /// The failing operation.
        op: Operation,
        /// The bound that would be violated.
        min: usize,
        /// The count the operation would have produced.
        requested: usize,
    },

    /// The operation is not legal for this parent set or node.
    #[error("{op}: {reason}")]
    InvalidOperation {
        /// The failing operation.
        op: Operation,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The node cannot be pointed at.
    #[error("{op}: {node} cannot be used as a parent")]
    NotAParent {
        /// The failing operation.
        op: Operation,
        /// The offered parent.
        node: NodeId,
    },

    /// The node owns no parent set.
    #[error("{node} has no parent set")]
    NotAChild {
        /// The node that was addressed as a child.
        node: NodeId,
    },

    /// The handle refers to a removed node.
    #[error("{node} is not a live node")]
    StaleNode {
        /// The dead handle.
        node: NodeId,
    },

    /// The node cannot be removed while children still point at it.
    #[error("{node} is still referenced by {} child(ren)", .children.len())]
    StillReferenced {
        /// The node that was asked to be removed.
        node: NodeId,
        /// Its registered children.
        children: Vec<NodeId>,
    },

    /// A staged parent reference could not be resolved to a node.
    #[error("unresolved parent reference `{name}`")]
    Unresolved {
        /// The unresolved name.
        name: String,
    },
}

/// Errors escaping an evaluation round or a finalization flush.
///
/// Host failures are wrapped in `Arc` so the error stays cheap to clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A structural edit was rejected.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// A node's recompute body failed. The round is aborted with pending and
    /// finalization state partially drained.
    #[error("recompute of {node} failed: {error}")]
    Recompute {
        /// The node whose body failed.
        node: NodeId,
        /// The host error.
        error: Arc<anyhow::Error>,
    },

    /// An output observer failed during finalization. Remaining observers of
    /// the flush are skipped.
    #[error("output observer of {node} failed: {error}")]
    Observer {
        /// The output node being emitted.
        node: NodeId,
        /// The host error.
        error: Arc<anyhow::Error>,
    },

    /// The post-round audit found parent/child or depth disagreements.
    #[error("graph audit found {} violation(s)", .0.len())]
    Consistency(Vec<ConsistencyViolation>),
}

impl Error {
    /// Returns the structural error if this is a `Structural` variant.
    pub fn structural(&self) -> Option<&StructuralError> {
        match self {
            Error::Structural(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the host error for `Recompute` and `Observer` variants.
    pub fn host_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            Error::Recompute { error, .. } | Error::Observer { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Attempts to downcast the host error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.host_error().and_then(|e| e.downcast_ref::<E>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("division by zero")]
    struct DivByZero;

    #[test]
    fn test_type_mismatch_message() {
        let err = StructuralError::TypeMismatch {
            op: Operation::Insert,
            index: 2,
            expected: SlotType::Exactly(TypeTag::new("bool")),
            actual: None,
            node: None,
        };
        assert_eq!(
            err.to_string(),
            "insert: slot 2 expects bool, found an empty slot"
        );
    }

    #[test]
    fn test_host_error_downcast() {
        let err = Error::Recompute {
            node: NodeId::new(0, 1),
            error: Arc::new(anyhow::Error::new(DivByZero)),
        };
        assert!(err.downcast_ref::<DivByZero>().is_some());
        assert!(err.structural().is_none());
    }
}
