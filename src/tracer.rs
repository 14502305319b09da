//! Tracer trait for observing graph edits and propagation rounds.
//!
//! Every method has an empty default implementation, so an implementation
//! overrides only the events it cares about. [`NoopTracer`] is the default and
//! costs nothing.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use blackboard::{Blackboard, NodeId, Tracer};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn on_recompute(&self, node: NodeId, changed: bool) {
//!         println!("recomputed {node}: changed={changed}");
//!     }
//! }
//!
//! let board: Blackboard<bool> = Blackboard::builder().tracer(Arc::new(PrintTracer)).build();
//! # let _ = board;
//! ```

use crate::node::{Depth, NodeId};
use crate::runtime::RoundSummary;

/// Identifier of one evaluation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundId(pub u64);

/// Tracer trait for observing the engine.
///
/// Implementations must be `Send + Sync` so one tracer can be shared between
/// several graphs owned by different threads.
pub trait Tracer: Send + Sync + 'static {
    /// Called when a node enters the arena.
    #[inline]
    fn on_node_added(&self, _node: NodeId) {}

    /// Called when a node leaves the arena.
    #[inline]
    fn on_node_removed(&self, _node: NodeId) {}

    /// Called when `child` is registered in `parent`'s child set.
    #[inline]
    fn on_child_added(&self, _parent: NodeId, _child: NodeId) {}

    /// Called when `child` is unregistered from `parent`'s child set.
    #[inline]
    fn on_child_removed(&self, _parent: NodeId, _child: NodeId) {}

    /// Called when a staged child is committed to the permanent graph.
    #[inline]
    fn on_legitimized(&self, _child: NodeId) {}

    /// Called when a node enters a pending set.
    #[inline]
    fn on_pending_inserted(&self, _node: NodeId, _depth: Depth) {}

    /// Called when depth repair assigns a new depth.
    #[inline]
    fn on_depth_changed(&self, _node: NodeId, _old: Depth, _new: Depth) {}

    /// Called after a node is recomputed during evaluation.
    #[inline]
    fn on_recompute(&self, _node: NodeId, _changed: bool) {}

    /// Called when a recompute body fails.
    #[inline]
    fn on_recompute_failed(&self, _node: NodeId, _error: &anyhow::Error) {}

    /// Called when a provoked trigger is reset during finalization.
    #[inline]
    fn on_trigger_reset(&self, _node: NodeId) {}

    /// Called after an output's observers have been notified.
    #[inline]
    fn on_output_emitted(&self, _node: NodeId) {}

    /// Called when finalization is withheld because the board is suspended.
    #[inline]
    fn on_finalization_deferred(&self, _resets: usize, _emits: usize) {}

    /// Called when a round is opened.
    #[inline]
    fn on_round_start(&self, _round: RoundId) {}

    /// Called when a round settles successfully.
    #[inline]
    fn on_round_end(&self, _round: RoundId, _summary: &RoundSummary) {}
}

/// A tracer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// A tracer that forwards events to the `tracing` crate.
///
/// Structural events are logged at `trace` level, round boundaries and
/// failures at `debug`.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTracer;

#[cfg(feature = "tracing")]
impl Tracer for TracingTracer {
    fn on_node_added(&self, node: NodeId) {
        tracing::trace!(%node, "node added");
    }

    fn on_node_removed(&self, node: NodeId) {
        tracing::trace!(%node, "node removed");
    }

    fn on_child_added(&self, parent: NodeId, child: NodeId) {
        tracing::trace!(%parent, %child, "child added");
    }

    fn on_child_removed(&self, parent: NodeId, child: NodeId) {
        tracing::trace!(%parent, %child, "child removed");
    }

    fn on_legitimized(&self, child: NodeId) {
        tracing::trace!(%child, "child legitimized");
    }

    fn on_pending_inserted(&self, node: NodeId, depth: Depth) {
        tracing::trace!(%node, depth, "pending");
    }

    fn on_depth_changed(&self, node: NodeId, old: Depth, new: Depth) {
        tracing::trace!(%node, old, new, "depth changed");
    }

    fn on_recompute(&self, node: NodeId, changed: bool) {
        tracing::trace!(%node, changed, "recomputed");
    }

    fn on_recompute_failed(&self, node: NodeId, error: &anyhow::Error) {
        tracing::debug!(%node, error = %error, "recompute failed");
    }

    fn on_trigger_reset(&self, node: NodeId) {
        tracing::trace!(%node, "trigger reset");
    }

    fn on_output_emitted(&self, node: NodeId) {
        tracing::trace!(%node, "output emitted");
    }

    fn on_finalization_deferred(&self, resets: usize, emits: usize) {
        tracing::debug!(resets, emits, "finalization deferred");
    }

    fn on_round_start(&self, round: RoundId) {
        tracing::debug!(round = round.0, "round started");
    }

    fn on_round_end(&self, round: RoundId, summary: &RoundSummary) {
        tracing::debug!(
            round = round.0,
            depth_changes = summary.depth_changes,
            recomputed = summary.recomputed,
            resets = summary.resets,
            emits = summary.emits,
            flushed = summary.flushed,
            "round settled"
        );
    }
}
