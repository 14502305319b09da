//! Property tests: random DAGs under random edits stay consistent and settle
//! to the same values as a from-scratch evaluation.

use blackboard::{audit, Blackboard, Graph, Inputs, NodeBuilder, NodeId, ParentLayout, TypeTag};
use proptest::prelude::*;

const INT: TypeTag = TypeTag::new("int");
const INPUTS: usize = 3;
const MAX_PARENTS: usize = 16;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parent indices for every derived node; node `i` only points at nodes `< i`.
fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (INPUTS + 1..24usize).prop_flat_map(|n| {
        (INPUTS..n)
            .map(|i| prop::collection::vec(0..i, 0..4))
            .collect::<Vec<_>>()
    })
}

#[derive(Debug, Clone)]
enum Edit {
    Insert { node: usize, parent: usize },
    Remove { node: usize },
    Set { input: usize, value: i64 },
}

fn arb_edits() -> impl Strategy<Value = Vec<Edit>> {
    let edit = prop_oneof![
        (any::<usize>(), any::<usize>()).prop_map(|(node, parent)| Edit::Insert { node, parent }),
        any::<usize>().prop_map(|node| Edit::Remove { node }),
        (any::<usize>(), -50i64..50).prop_map(|(input, value)| Edit::Set { input, value }),
    ];
    prop::collection::vec(edit, 0..32)
}

fn build(dag: &[Vec<usize>]) -> (Blackboard<i64>, Vec<NodeId>) {
    let mut board = Blackboard::builder().audit_rounds(true).build();
    let graph = board.graph_mut();
    let mut ids: Vec<NodeId> = (0..INPUTS)
        .map(|i| graph.add(NodeBuilder::input(INT, i as i64)).unwrap())
        .collect();
    for parents in dag {
        let id = graph
            .add(
                NodeBuilder::derived(
                    INT,
                    0,
                    ParentLayout::variable(INT, 0, MAX_PARENTS),
                    |i: &Inputs<i64>| Ok(i.variable().fold(0i64, |acc, v| acc.wrapping_add(*v))),
                )
                .parents(parents.iter().map(|&p| Some(ids[p]))),
            )
            .unwrap();
        ids.push(id);
    }
    (board, ids)
}

/// Evaluate every node from scratch in index order.
fn oracle(graph: &Graph<i64>, ids: &[NodeId]) -> Vec<i64> {
    let mut values: Vec<i64> = Vec::with_capacity(ids.len());
    for (i, &id) in ids.iter().enumerate() {
        let value = if i < INPUTS {
            *graph.value(id).unwrap()
        } else {
            graph
                .parent_set(id)
                .unwrap()
                .occupied()
                .map(|p| values[ids.iter().position(|&x| x == p).unwrap()])
                .fold(0i64, |acc, v| acc.wrapping_add(v))
        };
        values.push(value);
    }
    values
}

fn apply(board: &mut Blackboard<i64>, ids: &[NodeId], edits: &[Edit]) {
    let derived = ids.len() - INPUTS;
    let mut round = Vec::new();
    for edit in edits {
        match *edit {
            Edit::Insert { node, parent } => {
                let node = INPUTS + node % derived;
                let parent = ids[parent % node];
                let mut set = board.graph_mut().parent_set_mut(ids[node]).unwrap();
                let len = set.current().unwrap().len();
                if len < MAX_PARENTS {
                    set.insert(len, &[parent], None).unwrap();
                }
            }
            Edit::Remove { node } => {
                let node = ids[INPUTS + node % derived];
                let mut set = board.graph_mut().parent_set_mut(node).unwrap();
                if !set.current().unwrap().is_empty() {
                    set.remove(0, 1).unwrap();
                }
            }
            Edit::Set { input, value } => round.push((ids[input % INPUTS], value)),
        }
    }
    let mut open = board.round();
    for (node, value) in round {
        open.set(node, value).unwrap();
    }
    open.settle().unwrap();
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// A freshly built graph settles to the from-scratch values.
    #[test]
    fn first_round_matches_oracle(dag in arb_dag()) {
        let (mut board, ids) = build(&dag);
        board.round().settle().unwrap();

        let expected = oracle(board.graph(), &ids);
        let actual: Vec<i64> = ids.iter().map(|&id| *board.graph().value(id).unwrap()).collect();
        prop_assert_eq!(actual, expected);
    }

    /// Edits followed by a round keep parents and children in agreement,
    /// keep depths exact and settle to the from-scratch values.
    #[test]
    fn edits_keep_graph_consistent(dag in arb_dag(), batches in prop::collection::vec(arb_edits(), 1..4)) {
        let (mut board, ids) = build(&dag);
        board.round().settle().unwrap();

        for edits in &batches {
            apply(&mut board, &ids, edits);

            let report = audit(board.graph());
            prop_assert!(report.is_consistent(), "{:?}", report.violations);
            let expected = oracle(board.graph(), &ids);
            let actual: Vec<i64> =
                ids.iter().map(|&id| *board.graph().value(id).unwrap()).collect();
            prop_assert_eq!(actual, expected);
        }
    }

    /// Every derived node sits strictly deeper than each of its parents.
    #[test]
    fn depth_exceeds_every_parent(dag in arb_dag(), edits in arb_edits()) {
        let (mut board, ids) = build(&dag);
        apply(&mut board, &ids, &edits);

        let graph = board.graph();
        for &id in &ids[INPUTS..] {
            let depth = graph.depth(id).unwrap();
            for parent in graph.parent_set(id).unwrap().occupied() {
                prop_assert!(graph.depth(parent).unwrap() < depth);
            }
        }
    }
}
