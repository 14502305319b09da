//! Post-evaluation work: trigger resets and output emission.

use std::collections::BTreeSet;

use crate::error::Error;
use crate::graph::Graph;
use crate::node::NodeId;

/// Nodes whose post-evaluation work is due at the end of a round.
///
/// Provoked triggers are reset and outputs with an unflushed change notify
/// their observers. While suspended, [`Finalization::perform`] is a no-op and
/// both sets keep accumulating until the board resumes.
#[derive(Debug, Default)]
pub struct Finalization {
    needs_reset: BTreeSet<NodeId>,
    needs_emit: BTreeSet<NodeId>,
    suspended: bool,
}

impl Finalization {
    /// Create an empty, unsuspended finalization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify nodes that changed during evaluation.
    pub fn add<V>(&mut self, graph: &Graph<V>, nodes: impl IntoIterator<Item = NodeId>) {
        for id in nodes {
            let Some(node) = graph.get(id) else {
                continue;
            };
            if node.is_provoked() {
                self.needs_reset.insert(id);
            }
            if node.has_pending_emit() {
                self.needs_emit.insert(id);
            }
        }
    }

    /// Reset every provoked trigger, then notify every pending output.
    ///
    /// Both sets are taken before any work starts, so they are empty when
    /// this returns, even on error. An observer failure stops the flush.
    pub fn perform<V>(&mut self, graph: &mut Graph<V>) -> Result<(), Error> {
        if self.suspended {
            return Ok(());
        }
        let resets = std::mem::take(&mut self.needs_reset);
        let emits = std::mem::take(&mut self.needs_emit);
        for id in resets {
            graph.reset_trigger(id);
        }
        for id in emits {
            graph.emit(id)?;
        }
        Ok(())
    }

    /// Suspend or resume finalization. Resuming does not flush by itself.
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// Returns true while finalization is withheld.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Triggers awaiting reset.
    pub fn needs_reset(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.needs_reset.iter().copied()
    }

    /// Outputs awaiting emission.
    pub fn needs_emit(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.needs_emit.iter().copied()
    }

    /// Returns true if no work is due.
    pub fn is_empty(&self) -> bool {
        self.needs_reset.is_empty() && self.needs_emit.is_empty()
    }
}
