//! Event collector for testing.
//!
//! [`EventCollector`] is a [`Tracer`] that records every event as a
//! [`FlowEvent`] for later inspection and assertion.

use parking_lot::Mutex;

use crate::node::{Depth, NodeId};
use crate::runtime::RoundSummary;
use crate::tracer::{RoundId, Tracer};

/// One recorded engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "type")
)]
pub enum FlowEvent {
    /// A node entered the arena.
    NodeAdded {
        /// The node.
        node: NodeId,
    },
    /// A node left the arena.
    NodeRemoved {
        /// The node.
        node: NodeId,
    },
    /// A child was registered on a parent.
    ChildAdded {
        /// The parent.
        parent: NodeId,
        /// The child.
        child: NodeId,
    },
    /// A child was unregistered from a parent.
    ChildRemoved {
        /// The parent.
        parent: NodeId,
        /// The child.
        child: NodeId,
    },
    /// A staged child was committed.
    Legitimized {
        /// The child.
        child: NodeId,
    },
    /// A node entered a pending set.
    PendingInserted {
        /// The node.
        node: NodeId,
        /// Depth it was keyed under.
        depth: Depth,
    },
    /// Depth repair moved a node.
    DepthChanged {
        /// The node.
        node: NodeId,
        /// Previous depth.
        old: Depth,
        /// Repaired depth.
        new: Depth,
    },
    /// A node was recomputed.
    Recomputed {
        /// The node.
        node: NodeId,
        /// Whether its value changed.
        changed: bool,
    },
    /// A recompute body failed.
    RecomputeFailed {
        /// The node.
        node: NodeId,
        /// The host error, rendered.
        message: String,
    },
    /// A provoked trigger was reset.
    TriggerReset {
        /// The trigger.
        node: NodeId,
    },
    /// An output's observers were notified.
    OutputEmitted {
        /// The output.
        node: NodeId,
    },
    /// Finalization was withheld by suspension.
    FinalizationDeferred {
        /// Triggers awaiting reset.
        resets: usize,
        /// Outputs awaiting emission.
        emits: usize,
    },
    /// A round was opened.
    RoundStart {
        /// The round.
        round: RoundId,
    },
    /// A round settled.
    RoundEnd {
        /// The round.
        round: RoundId,
        /// Its counters.
        summary: RoundSummary,
    },
}

/// Event collector for testing - accumulates events for assertions.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use blackboard::{Blackboard, EventCollector, FlowEvent, NodeBuilder, TypeTag};
///
/// let collector = Arc::new(EventCollector::new());
/// let mut board: Blackboard<i64> = Blackboard::builder().tracer(collector.clone()).build();
/// let a = board.graph_mut().add(NodeBuilder::input(TypeTag::new("int"), 0)).unwrap();
///
/// assert_eq!(collector.events(), vec![FlowEvent::NodeAdded { node: a }]);
/// ```
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<FlowEvent>>,
}

impl EventCollector {
    /// Create a new empty event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get collected events as a vector.
    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().clone()
    }

    /// Nodes recomputed so far, in evaluation order.
    pub fn recomputed(&self) -> Vec<NodeId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                FlowEvent::Recomputed { node, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Take collected events, clearing the collector.
    pub fn take(&self) -> Vec<FlowEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Get the number of collected events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if no events have been collected.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn record(&self, event: FlowEvent) {
        self.events.lock().push(event);
    }
}

impl Tracer for EventCollector {
    fn on_node_added(&self, node: NodeId) {
        self.record(FlowEvent::NodeAdded { node });
    }

    fn on_node_removed(&self, node: NodeId) {
        self.record(FlowEvent::NodeRemoved { node });
    }

    fn on_child_added(&self, parent: NodeId, child: NodeId) {
        self.record(FlowEvent::ChildAdded { parent, child });
    }

    fn on_child_removed(&self, parent: NodeId, child: NodeId) {
        self.record(FlowEvent::ChildRemoved { parent, child });
    }

    fn on_legitimized(&self, child: NodeId) {
        self.record(FlowEvent::Legitimized { child });
    }

    fn on_pending_inserted(&self, node: NodeId, depth: Depth) {
        self.record(FlowEvent::PendingInserted { node, depth });
    }

    fn on_depth_changed(&self, node: NodeId, old: Depth, new: Depth) {
        self.record(FlowEvent::DepthChanged { node, old, new });
    }

    fn on_recompute(&self, node: NodeId, changed: bool) {
        self.record(FlowEvent::Recomputed { node, changed });
    }

    fn on_recompute_failed(&self, node: NodeId, error: &anyhow::Error) {
        self.record(FlowEvent::RecomputeFailed {
            node,
            message: error.to_string(),
        });
    }

    fn on_trigger_reset(&self, node: NodeId) {
        self.record(FlowEvent::TriggerReset { node });
    }

    fn on_output_emitted(&self, node: NodeId) {
        self.record(FlowEvent::OutputEmitted { node });
    }

    fn on_finalization_deferred(&self, resets: usize, emits: usize) {
        self.record(FlowEvent::FinalizationDeferred { resets, emits });
    }

    fn on_round_start(&self, round: RoundId) {
        self.record(FlowEvent::RoundStart { round });
    }

    fn on_round_end(&self, round: RoundId, summary: &RoundSummary) {
        self.record(FlowEvent::RoundEnd {
            round,
            summary: *summary,
        });
    }
}
