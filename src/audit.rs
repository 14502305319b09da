//! Consistency audit of a graph.
//!
//! The audit walks every node and checks that parent sets and child sets
//! agree in both directions, and that every legitimate evaluable node's
//! recorded depth matches the depth computed from its parents. Depths are
//! only repaired when a round settles, so the depth check is meaningful
//! between rounds, not between a structural edit and the next round.

use crate::error::Error;
use crate::graph::Graph;
use crate::node::{Depth, NodeId};

/// A disagreement found by [`audit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConsistencyViolation {
    /// A legitimate child points at a parent that does not list it.
    #[error("{child} points at {parent}, which does not list it")]
    MissingRegistration {
        /// The parent missing the registration.
        parent: NodeId,
        /// The child.
        child: NodeId,
    },

    /// A parent lists a child that does not point at it.
    #[error("{parent} lists {child}, which does not point at it")]
    DanglingChild {
        /// The parent.
        parent: NodeId,
        /// The child listed in error.
        child: NodeId,
    },

    /// A parent lists a child that has not been legitimized.
    #[error("{parent} lists illegitimate child {child}")]
    IllegitimateChild {
        /// The parent.
        parent: NodeId,
        /// The staged child.
        child: NodeId,
    },

    /// A child points at a removed node.
    #[error("{child} points at dead node {parent}")]
    DeadParent {
        /// The dead handle.
        parent: NodeId,
        /// The child.
        child: NodeId,
    },

    /// A parent lists a removed node.
    #[error("{parent} lists dead node {child}")]
    DeadChild {
        /// The parent.
        parent: NodeId,
        /// The dead handle.
        child: NodeId,
    },

    /// A recorded depth differs from the depth computed from the parents.
    #[error("{node} has depth {actual}, expected {expected}")]
    DepthMismatch {
        /// The node.
        node: NodeId,
        /// Depth computed from the parents.
        expected: Depth,
        /// Depth recorded on the node.
        actual: Depth,
    },
}

/// Result of [`audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Number of nodes visited.
    pub nodes_checked: usize,
    /// Every violation found.
    pub violations: Vec<ConsistencyViolation>,
}

impl AuditReport {
    /// Returns true if no violation was found.
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    /// Convert into a result, failing with [`Error::Consistency`].
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_consistent() {
            Ok(())
        } else {
            Err(Error::Consistency(self.violations))
        }
    }
}

/// Check parent/child agreement and depths over the whole graph.
pub fn audit<V>(graph: &Graph<V>) -> AuditReport {
    let mut report = AuditReport::default();

    for node in graph.iter() {
        report.nodes_checked += 1;
        let id = node.id();

        if let Some(parents) = node.parents() {
            for parent in parents.distinct() {
                if !graph.contains(parent) {
                    report
                        .violations
                        .push(ConsistencyViolation::DeadParent { parent, child: id });
                } else if node.is_legitimate()
                    && !graph
                        .get(parent)
                        .and_then(|p| p.parent_facet())
                        .is_some_and(|facet| facet.has_child(id))
                {
                    report
                        .violations
                        .push(ConsistencyViolation::MissingRegistration { parent, child: id });
                }
            }
        }

        if let Some(facet) = node.parent_facet() {
            for child in facet.children() {
                let violation = match graph.get(child) {
                    None => Some(ConsistencyViolation::DeadChild { parent: id, child }),
                    Some(c) if !c.is_legitimate() => {
                        Some(ConsistencyViolation::IllegitimateChild { parent: id, child })
                    }
                    Some(c) if !c.parents().is_some_and(|set| set.contains(id)) => {
                        Some(ConsistencyViolation::DanglingChild { parent: id, child })
                    }
                    Some(_) => None,
                };
                report.violations.extend(violation);
            }
        }

        if let Some(actual) = node.depth().filter(|_| node.is_legitimate()) {
            let expected = graph.computed_depth(id);
            if expected != actual {
                report.violations.push(ConsistencyViolation::DepthMismatch {
                    node: id,
                    expected,
                    actual,
                });
            }
        }
    }

    report
}
