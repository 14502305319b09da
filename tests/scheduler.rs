//! Round scheduling: ordering, glitch freedom and finalization.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use blackboard::{
    Blackboard, Error, Graph, Inputs, NodeBuilder, NodeId, ParentLayout, TriggerFacet, TypeTag,
};

const BOOL: TypeTag = TypeTag::new("bool");
const INT: TypeTag = TypeTag::new("int");

// ============================================================================
// Helpers
// ============================================================================

fn bool_trigger() -> TriggerFacet<bool> {
    TriggerFacet::new(|v| *v, |v, provoked| *v = provoked)
}

fn and(graph: &mut Graph<bool>, a: NodeId, b: NodeId) -> NodeId {
    graph
        .add(
            NodeBuilder::derived(BOOL, false, ParentLayout::fixed([BOOL, BOOL]), |i: &Inputs<bool>| {
                Ok(i.iter().all(|v| v.copied().unwrap_or(false)))
            })
            .parents([Some(a), Some(b)])
            .output(),
        )
        .unwrap()
}

fn not(graph: &mut Graph<bool>, a: NodeId) -> NodeId {
    graph
        .add(
            NodeBuilder::derived(BOOL, false, ParentLayout::fixed([BOOL]), |i: &Inputs<bool>| {
                Ok(!i.get(0).copied().unwrap_or(false))
            })
            .parents([Some(a)])
            .output(),
        )
        .unwrap()
}

/// A counted sum over the variable region.
fn counted_sum(graph: &mut Graph<i64>, parents: &[NodeId], calls: &Rc<Cell<usize>>) -> NodeId {
    let calls = calls.clone();
    graph
        .add(
            NodeBuilder::derived(INT, 0, ParentLayout::variable(INT, 0, 8), move |i: &Inputs<i64>| {
                calls.set(calls.get() + 1);
                Ok(i.variable().sum())
            })
            .parents(parents.iter().copied().map(Some)),
        )
        .unwrap()
}

fn record(graph: &mut Graph<bool>, node: NodeId, log: &Rc<RefCell<Vec<(NodeId, bool)>>>) {
    let log = log.clone();
    graph
        .observe(node, move |id, value: &bool| {
            log.borrow_mut().push((id, *value));
            Ok(())
        })
        .unwrap();
}

// ============================================================================
// Propagation
// ============================================================================

#[test]
fn test_and_not_end_to_end() {
    let mut board = Blackboard::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(BOOL, false)).unwrap();
    let b = graph.add(NodeBuilder::input(BOOL, false)).unwrap();
    let c = and(graph, a, b);
    let d = not(graph, c);
    record(graph, c, &log);
    record(graph, d, &log);

    // First round evaluates the new derived nodes: d flips to true.
    board.round().settle().unwrap();
    assert_eq!(board.graph().value(c), Some(&false));
    assert_eq!(board.graph().value(d), Some(&true));
    assert_eq!(log.take(), vec![(d, true)]);

    let mut round = board.round();
    round.set(a, true).unwrap();
    round.set(b, true).unwrap();
    let summary = round.settle().unwrap();

    assert_eq!(board.graph().value(c), Some(&true));
    assert_eq!(board.graph().value(d), Some(&false));
    assert_eq!(summary.recomputed, 4);
    assert_eq!(summary.emits, 2);
    assert_eq!(log.take(), vec![(c, true), (d, false)]);
}

#[test]
fn test_diamond_recomputes_join_once() {
    let mut board = Blackboard::new();
    let calls = Rc::new(Cell::new(0));
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
    let b = counted_sum(graph, &[a], &Rc::new(Cell::new(0)));
    let c = counted_sum(graph, &[a, a], &Rc::new(Cell::new(0)));
    let d = counted_sum(graph, &[b, c], &calls);
    board.round().settle().unwrap();
    assert_eq!(board.graph().value(d), Some(&3));
    calls.set(0);

    let mut round = board.round();
    round.set(a, 10).unwrap();
    round.settle().unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(board.graph().value(d), Some(&30));
}

#[test]
fn test_uneven_paths_recompute_once_after_both_parents() {
    let mut board = Blackboard::new();
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
    let b = counted_sum(graph, &[a], &Rc::new(Cell::new(0)));
    let c = counted_sum(graph, &[b], &Rc::new(Cell::new(0)));
    let d = counted_sum(graph, &[c], &Rc::new(Cell::new(0)));
    let log = seen.clone();
    let counter = calls.clone();
    let e = graph
        .add(
            NodeBuilder::derived(INT, 0, ParentLayout::fixed([INT, INT]), move |i: &Inputs<i64>| {
                counter.set(counter.get() + 1);
                let (x, y) = (i.get(0).copied().unwrap_or(0), i.get(1).copied().unwrap_or(0));
                log.borrow_mut().push((x, y));
                Ok(x - y)
            })
            .parents([Some(a), Some(d)]),
        )
        .unwrap();
    assert_eq!(board.graph().depth(e), Some(4));
    board.round().settle().unwrap();
    calls.set(0);
    seen.borrow_mut().clear();

    let mut round = board.round();
    round.set(a, 5).unwrap();
    round.settle().unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(*seen.borrow(), vec![(5, 5)]);
}

#[test]
fn test_unchanged_value_stops_propagation() {
    let mut board = Blackboard::new();
    let calls = Rc::new(Cell::new(0));
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(INT, 1i64)).unwrap();
    let clamped = graph
        .add(
            NodeBuilder::derived(INT, 0, ParentLayout::fixed([INT]), |i: &Inputs<i64>| {
                Ok(i.get(0).copied().unwrap_or(0).min(3))
            })
            .parents([Some(a)]),
        )
        .unwrap();
    counted_sum(graph, &[clamped], &calls);
    let mut round = board.round();
    round.set(a, 5).unwrap();
    round.settle().unwrap();
    assert_eq!(calls.get(), 1);

    let mut round = board.round();
    round.set(a, 7).unwrap();
    let summary = round.settle().unwrap();

    assert_eq!(summary.recomputed, 2);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_touch_recomputes_without_change() {
    let mut board = Blackboard::new();
    let calls = Rc::new(Cell::new(0));
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
    let s = counted_sum(graph, &[a], &calls);
    board.round().settle().unwrap();

    let mut round = board.round();
    assert_eq!(round.touch([s, s]), 1);
    let summary = round.settle().unwrap();
    assert_eq!(summary.recomputed, 1);
    assert_eq!(calls.get(), 2);
}

// ============================================================================
// Structural edits between rounds
// ============================================================================

#[test]
fn test_reparenting_is_picked_up_by_next_round() {
    let mut board = Blackboard::new();
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
    let b = graph.add(NodeBuilder::input(INT, 10)).unwrap();
    let s = counted_sum(graph, &[a], &Rc::new(Cell::new(0)));
    board.round().settle().unwrap();
    assert_eq!(board.graph().value(s), Some(&1));

    board
        .graph_mut()
        .parent_set_mut(s)
        .unwrap()
        .insert(1, &[b], None)
        .unwrap();
    board.round().settle().unwrap();
    assert_eq!(board.graph().value(s), Some(&11));

    board.graph_mut().parent_set_mut(s).unwrap().remove(0, 1).unwrap();
    board.round().settle().unwrap();
    assert_eq!(board.graph().value(s), Some(&10));
    assert!(board.graph().children(a).is_empty());
}

#[test]
fn test_audited_rounds_pass_on_consistent_graph() {
    let mut board: Blackboard<i64> = Blackboard::builder().audit_rounds(true).build();
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(INT, 1)).unwrap();
    let b = counted_sum(graph, &[a], &Rc::new(Cell::new(0)));
    let c = counted_sum(graph, &[a, b], &Rc::new(Cell::new(0)));
    board.round().settle().unwrap();

    board.graph_mut().parent_set_mut(c).unwrap().set(0, Some(b)).unwrap();
    let mut round = board.round();
    round.set(a, 2).unwrap();
    round.settle().unwrap();
    assert_eq!(board.graph().value(c), Some(&4));
}

// ============================================================================
// Finalization
// ============================================================================

#[test]
fn test_trigger_resets_after_round() {
    let mut board = Blackboard::new();
    let fired = Rc::new(Cell::new(0));
    let graph = board.graph_mut();
    let t = graph
        .add(NodeBuilder::input(BOOL, false).trigger(bool_trigger()))
        .unwrap();
    let counter = fired.clone();
    graph
        .add(
            NodeBuilder::derived(BOOL, false, ParentLayout::fixed([BOOL]), move |i: &Inputs<bool>| {
                let provoked = i.get(0).copied().unwrap_or(false);
                if provoked {
                    counter.set(counter.get() + 1);
                }
                Ok(provoked)
            })
            .parents([Some(t)]),
        )
        .unwrap();
    board.round().settle().unwrap();

    let mut round = board.round();
    assert_eq!(round.provoke(t), Ok(true));
    let summary = round.settle().unwrap();

    assert_eq!(summary.resets, 1);
    assert_eq!(fired.get(), 1);
    assert!(!board.graph().get(t).unwrap().is_provoked());

    let summary = board.round().settle().unwrap();
    assert_eq!(summary.recomputed, 0);
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_suspend_batches_notifications() {
    let mut board = Blackboard::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(BOOL, false)).unwrap();
    let b = not(graph, a);
    record(graph, b, &log);
    board.round().settle().unwrap();
    log.borrow_mut().clear();

    board.suspend();
    for value in [true, false, true] {
        let mut round = board.round();
        round.set(a, value).unwrap();
        assert!(!round.settle().unwrap().flushed);
    }
    assert!(log.borrow().is_empty());
    assert_eq!(board.finalization().needs_emit().collect::<Vec<_>>(), vec![b]);

    board.resume().unwrap();
    assert_eq!(log.take(), vec![(b, false)]);
    assert!(board.finalization().is_empty());
}

#[test]
fn test_observer_failure_surfaces_from_settle() {
    let mut board = Blackboard::new();
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(BOOL, false).output()).unwrap();
    graph
        .observe(a, |_, value: &bool| {
            if *value {
                anyhow::bail!("sink rejected true");
            }
            Ok(())
        })
        .unwrap();

    let mut round = board.round();
    round.set(a, true).unwrap();
    let err = round.settle().unwrap_err();
    assert!(matches!(err, Error::Observer { node, .. } if node == a));
    assert!(board.finalization().is_empty());

    let mut round = board.round();
    round.set(a, false).unwrap();
    assert!(round.settle().is_ok());
}

#[derive(Debug, thiserror::Error)]
#[error("negative input")]
struct NegativeInput;

#[test]
fn test_recompute_failure_aborts_round() {
    let mut board = Blackboard::new();
    let graph = board.graph_mut();
    let a = graph.add(NodeBuilder::input(INT, 4i64)).unwrap();
    let root = graph
        .add(
            NodeBuilder::derived(INT, 0, ParentLayout::fixed([INT]), |i: &Inputs<i64>| {
                let x = i.get(0).copied().unwrap_or(0);
                if x < 0 {
                    return Err(NegativeInput.into());
                }
                Ok((x as f64).sqrt() as i64)
            })
            .parents([Some(a)]),
        )
        .unwrap();
    board.round().settle().unwrap();
    assert_eq!(board.graph().value(root), Some(&2));

    let mut round = board.round();
    round.set(a, -1).unwrap();
    let err = round.settle().unwrap_err();
    assert!(err.downcast_ref::<NegativeInput>().is_some());
    assert_eq!(board.graph().value(root), Some(&2));

    let mut round = board.round();
    round.set(a, 9).unwrap();
    round.settle().unwrap();
    assert_eq!(board.graph().value(root), Some(&3));
}
