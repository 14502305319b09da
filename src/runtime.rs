//! Blackboard: a graph plus the round orchestration that keeps it settled.

use std::sync::Arc;

use crate::audit::audit;
use crate::error::{Error, StructuralError};
use crate::finalization::Finalization;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::pending::EvalPending;
use crate::tracer::{NoopTracer, RoundId, Tracer};

/// Counters describing one settled round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundSummary {
    /// Nodes whose depth was repaired before evaluation.
    pub depth_changes: usize,
    /// Nodes recomputed during evaluation.
    pub recomputed: usize,
    /// Triggers due for reset when evaluation finished.
    pub resets: usize,
    /// Outputs due for emission when evaluation finished.
    pub emits: usize,
    /// Whether finalization ran. False while the board is suspended.
    pub flushed: bool,
}

/// The engine entry point: owns a [`Graph`] and its [`Finalization`].
///
/// Structural edits go straight to [`Blackboard::graph_mut`]. Value changes
/// are made through a [`Round`], which repairs depths, propagates and
/// finalizes when settled.
///
/// # Example
///
/// ```
/// # use blackboard::{Blackboard, Inputs, NodeBuilder, ParentLayout, TypeTag};
/// const BOOL: TypeTag = TypeTag::new("bool");
///
/// let mut board = Blackboard::new();
/// let a = board.graph_mut().add(NodeBuilder::input(BOOL, false)).unwrap();
/// let not_a = board
///     .graph_mut()
///     .add(
///         NodeBuilder::derived(BOOL, false, ParentLayout::fixed([BOOL]), |i: &Inputs<bool>| {
///             Ok(!i.get(0).copied().unwrap_or(false))
///         })
///         .parents([Some(a)]),
///     )
///     .unwrap();
///
/// board.round().settle().unwrap();
/// assert_eq!(board.graph().value(not_a), Some(&true));
///
/// let mut round = board.round();
/// round.set(a, true).unwrap();
/// round.settle().unwrap();
/// assert_eq!(board.graph().value(not_a), Some(&false));
/// ```
pub struct Blackboard<V> {
    graph: Graph<V>,
    finalization: Finalization,
    audit_rounds: bool,
    next_round: u64,
}

impl<V> Default for Blackboard<V> {
    fn default() -> Self {
        BlackboardBuilder::new().build()
    }
}

impl<V> std::fmt::Debug for Blackboard<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blackboard")
            .field("graph", &self.graph)
            .field("finalization", &self.finalization)
            .field("audit_rounds", &self.audit_rounds)
            .finish()
    }
}

impl Blackboard<()> {
    /// Create a builder for customizing the board.
    ///
    /// The value type is chosen by [`BlackboardBuilder::build`].
    pub fn builder() -> BlackboardBuilder {
        BlackboardBuilder::new()
    }
}

impl<V> Blackboard<V> {
    /// Create a board with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// The graph.
    pub fn graph(&self) -> &Graph<V> {
        &self.graph
    }

    /// The graph, for structural edits. Edits take effect in the next round.
    pub fn graph_mut(&mut self) -> &mut Graph<V> {
        &mut self.graph
    }

    /// Work due at the end of the next flush.
    pub fn finalization(&self) -> &Finalization {
        &self.finalization
    }

    /// Withhold trigger resets and output emission until [`Blackboard::resume`].
    pub fn suspend(&mut self) {
        self.finalization.set_suspended(true);
    }

    /// Returns true while finalization is withheld.
    pub fn is_suspended(&self) -> bool {
        self.finalization.is_suspended()
    }

    /// Stop withholding finalization and flush everything accumulated.
    pub fn resume(&mut self) -> Result<(), Error> {
        self.finalization.set_suspended(false);
        self.finalization.perform(&mut self.graph)
    }

    /// Open an evaluation round.
    pub fn round(&mut self) -> Round<'_, V> {
        self.next_round += 1;
        let id = RoundId(self.next_round);
        self.graph.tracer().on_round_start(id);
        Round {
            board: self,
            pending: EvalPending::new(),
            id,
        }
    }
}

// ============================================================================
// Rounds
// ============================================================================

/// An open evaluation round.
///
/// Seed changes with [`Round::set`], [`Round::provoke`] or [`Round::touch`],
/// then call [`Round::settle`]. Dropping a round without settling discards
/// its seeds; host values already written stay written.
#[must_use = "a round does nothing until it is settled"]
pub struct Round<'b, V> {
    board: &'b mut Blackboard<V>,
    pending: EvalPending,
    id: RoundId,
}

impl<V> std::fmt::Debug for Round<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Round")
            .field("id", &self.id)
            .field("pending", &self.pending)
            .finish()
    }
}

impl<V: PartialEq + 'static> Round<'_, V> {
    /// Identifier of this round.
    pub fn id(&self) -> RoundId {
        self.id
    }

    /// Nodes seeded so far.
    pub fn pending(&self) -> &EvalPending {
        &self.pending
    }

    /// Write an input value and seed it. Returns false if the value is unchanged.
    pub fn set(&mut self, node: NodeId, value: V) -> Result<bool, StructuralError> {
        let changed = self.board.graph.set_value(node, value)?;
        if changed {
            self.pending.insert(&self.board.graph, [node]);
        }
        Ok(changed)
    }

    /// Provoke a trigger and seed it. Returns false if it was already provoked.
    pub fn provoke(&mut self, node: NodeId) -> Result<bool, StructuralError> {
        let provoked = self.board.graph.provoke(node)?;
        if provoked {
            self.pending.insert(&self.board.graph, [node]);
        }
        Ok(provoked)
    }

    /// Seed nodes for recomputation without changing anything.
    pub fn touch(&mut self, nodes: impl IntoIterator<Item = NodeId>) -> usize {
        self.pending.insert(&self.board.graph, nodes)
    }

    /// Settle the round.
    ///
    /// 1. Depth repair over every child whose parents changed since the last
    ///    round, cascading to descendants.
    /// 2. Every legitimate edited child joins the seeds, and the seeds are
    ///    re-keyed under their repaired depths.
    /// 3. Evaluation in depth order.
    /// 4. Finalization, unless the board is suspended.
    ///
    /// A failing recompute aborts the round; values already stored are kept.
    pub fn settle(self) -> Result<RoundSummary, Error> {
        let Round {
            board,
            mut pending,
            id,
        } = self;
        let graph = &mut board.graph;

        let edits = graph.take_structural_edits();
        let mut repair = EvalPending::new();
        repair.insert(graph, edits.iter().copied());
        let depth_changes = repair.update_depths(graph);

        let legitimate = edits.into_iter().filter(|&node| graph.is_legitimate(node));
        pending.insert(graph, legitimate.collect::<Vec<_>>());
        pending.rekey(graph);

        let recomputed = pending.evaluate(graph, &mut board.finalization)?;

        let resets = board.finalization.needs_reset().count();
        let emits = board.finalization.needs_emit().count();
        let flushed = !board.finalization.is_suspended();
        if flushed {
            board.finalization.perform(graph)?;
        } else {
            graph.tracer().on_finalization_deferred(resets, emits);
        }

        if board.audit_rounds {
            audit(graph).into_result()?;
        }

        let summary = RoundSummary {
            depth_changes,
            recomputed,
            resets,
            emits,
            flushed,
        };
        graph.tracer().on_round_end(id, &summary);
        Ok(summary)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Blackboard`] with customizable settings.
pub struct BlackboardBuilder {
    tracer: Arc<dyn Tracer>,
    audit_rounds: bool,
    start_suspended: bool,
}

impl Default for BlackboardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlackboardBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            tracer: Arc::new(NoopTracer),
            audit_rounds: false,
            start_suspended: false,
        }
    }

    /// Report graph and round events to `tracer`.
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Audit parent/child agreement and depths after every settled round.
    ///
    /// A failed audit makes [`Round::settle`] return [`Error::Consistency`].
    /// Off by default; the audit walks the whole graph.
    pub fn audit_rounds(mut self, enabled: bool) -> Self {
        self.audit_rounds = enabled;
        self
    }

    /// Start with finalization suspended.
    pub fn start_suspended(mut self, suspended: bool) -> Self {
        self.start_suspended = suspended;
        self
    }

    /// Build the board with the configured settings.
    pub fn build<V>(self) -> Blackboard<V> {
        let mut finalization = Finalization::new();
        finalization.set_suspended(self.start_suspended);
        Blackboard {
            graph: Graph::with_tracer(self.tracer),
            finalization,
            audit_rounds: self.audit_rounds,
            next_round: 0,
        }
    }
}
