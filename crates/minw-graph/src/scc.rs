//! Strongly connected component detection
//!
//! Runs within one reachability bucket (or over the whole graph) and is a
//! pure read of the edge structure. Only components of size > 1 are
//! returned; a singleton cannot contain a commit-order cycle.

use crate::ConflictGraph;
use minw_types::HyperVertexId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Which linear-time SCC algorithm to run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SccAlgorithm {
    /// Tarjan's index/low-link algorithm
    #[default]
    Tarjan,
    /// Gabow's two-stack algorithm
    Gabow,
}

/// Find all SCCs of size > 1 among `members`, following out-edges that
/// stay inside `members`
pub fn find_sccs(
    graph: &ConflictGraph,
    members: &BTreeSet<HyperVertexId>,
    algorithm: SccAlgorithm,
) -> Vec<BTreeSet<HyperVertexId>> {
    match algorithm {
        SccAlgorithm::Tarjan => tarjan(graph, members),
        SccAlgorithm::Gabow => gabow(graph, members),
    }
}

/// Whole-graph variant: every hypervertex is a member
pub fn find_all_sccs(graph: &ConflictGraph, algorithm: SccAlgorithm) -> Vec<BTreeSet<HyperVertexId>> {
    let members: BTreeSet<HyperVertexId> = (0..graph.arena().hyper_count())
        .map(HyperVertexId::from)
        .collect();
    find_sccs(graph, &members, algorithm)
}

fn neighbors(
    graph: &ConflictGraph,
    members: &BTreeSet<HyperVertexId>,
    h: HyperVertexId,
) -> Vec<HyperVertexId> {
    graph
        .conflict(h)
        .map(|c| c.out_hv.iter().copied().filter(|n| members.contains(n)).collect())
        .unwrap_or_default()
}

/// Tarjan's algorithm with an explicit frame stack (no recursion)
fn tarjan(graph: &ConflictGraph, members: &BTreeSet<HyperVertexId>) -> Vec<BTreeSet<HyperVertexId>> {
    let mut index: HashMap<HyperVertexId, u32> = HashMap::new();
    let mut lowlink: HashMap<HyperVertexId, u32> = HashMap::new();
    let mut on_stack: BTreeSet<HyperVertexId> = BTreeSet::new();
    let mut stack: Vec<HyperVertexId> = Vec::new();
    let mut next_index = 0u32;
    let mut sccs = Vec::new();

    struct Frame {
        v: HyperVertexId,
        neighbors: Vec<HyperVertexId>,
        cursor: usize,
    }

    for &start in members {
        if index.contains_key(&start) {
            continue;
        }
        let mut frames = vec![Frame {
            v: start,
            neighbors: neighbors(graph, members, start),
            cursor: 0,
        }];
        index.insert(start, next_index);
        lowlink.insert(start, next_index);
        next_index += 1;
        stack.push(start);
        on_stack.insert(start);

        while let Some(frame) = frames.last_mut() {
            if frame.cursor < frame.neighbors.len() {
                let w = frame.neighbors[frame.cursor];
                frame.cursor += 1;
                if !index.contains_key(&w) {
                    index.insert(w, next_index);
                    lowlink.insert(w, next_index);
                    next_index += 1;
                    stack.push(w);
                    on_stack.insert(w);
                    frames.push(Frame {
                        v: w,
                        neighbors: neighbors(graph, members, w),
                        cursor: 0,
                    });
                } else if on_stack.contains(&w) {
                    let v = frame.v;
                    let low = lowlink[&v].min(index[&w]);
                    lowlink.insert(v, low);
                }
            } else {
                let v = frame.v;
                if lowlink[&v] == index[&v] {
                    let mut component = BTreeSet::new();
                    while let Some(w) = stack.pop() {
                        on_stack.remove(&w);
                        component.insert(w);
                        if w == v {
                            break;
                        }
                    }
                    if component.len() > 1 {
                        sccs.push(component);
                    }
                }
                frames.pop();
                if let Some(parent) = frames.last() {
                    let low = lowlink[&parent.v].min(lowlink[&v]);
                    lowlink.insert(parent.v, low);
                }
            }
        }
    }
    sccs
}

/// Gabow's two-stack algorithm, also iterative
fn gabow(graph: &ConflictGraph, members: &BTreeSet<HyperVertexId>) -> Vec<BTreeSet<HyperVertexId>> {
    let mut preorder: HashMap<HyperVertexId, u32> = HashMap::new();
    let mut assigned: BTreeSet<HyperVertexId> = BTreeSet::new();
    let mut s: Vec<HyperVertexId> = Vec::new(); // all visited, not yet assigned
    let mut b: Vec<HyperVertexId> = Vec::new(); // boundary stack
    let mut next_index = 0u32;
    let mut sccs = Vec::new();

    struct Frame {
        v: HyperVertexId,
        neighbors: Vec<HyperVertexId>,
        cursor: usize,
    }

    for &start in members {
        if preorder.contains_key(&start) {
            continue;
        }
        preorder.insert(start, next_index);
        next_index += 1;
        s.push(start);
        b.push(start);
        let mut frames = vec![Frame {
            v: start,
            neighbors: neighbors(graph, members, start),
            cursor: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            if frame.cursor < frame.neighbors.len() {
                let w = frame.neighbors[frame.cursor];
                frame.cursor += 1;
                if let Some(&pw) = preorder.get(&w) {
                    if !assigned.contains(&w) {
                        // contract: pop boundary entries discovered after w
                        while b.last().map_or(false, |top| preorder[top] > pw) {
                            b.pop();
                        }
                    }
                } else {
                    preorder.insert(w, next_index);
                    next_index += 1;
                    s.push(w);
                    b.push(w);
                    frames.push(Frame {
                        v: w,
                        neighbors: neighbors(graph, members, w),
                        cursor: 0,
                    });
                }
            } else {
                let v = frame.v;
                frames.pop();
                if b.last() == Some(&v) {
                    b.pop();
                    let mut component = BTreeSet::new();
                    while let Some(w) = s.pop() {
                        component.insert(w);
                        assigned.insert(w);
                        if w == v {
                            break;
                        }
                    }
                    if component.len() > 1 {
                        sccs.push(component);
                    }
                }
            }
        }
    }
    sccs
}

#[cfg(test)]
mod tests {
    use super::*;
    use minw_types::{TxArena, TxNode};

    fn graph_from(txs: Vec<TxNode>) -> ConflictGraph {
        let mut arena = TxArena::new();
        for tx in &txs {
            arena.add_transaction(tx).unwrap();
        }
        let mut graph = ConflictGraph::new(arena);
        graph.build();
        graph
    }

    fn two_cycle_block() -> Vec<TxNode> {
        // T1 and T2 read each other's writes: T1 <-> T2
        vec![
            TxNode::new(1).write("a").read("b"),
            TxNode::new(1).write("b").read("a"),
        ]
    }

    // ==================== Detection ====================

    #[test]
    fn test_two_cycle_detected() {
        let graph = graph_from(two_cycle_block());
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 2);
    }

    #[test]
    fn test_acyclic_graph_has_no_sccs() {
        let graph = graph_from(vec![
            TxNode::new(10).write("k"),
            TxNode::new(5).read("k").write("k"),
            TxNode::new(5).read("k"),
        ]);
        assert!(find_all_sccs(&graph, SccAlgorithm::Tarjan).is_empty());
        assert!(find_all_sccs(&graph, SccAlgorithm::Gabow).is_empty());
    }

    #[test]
    fn test_singletons_are_dropped() {
        let graph = graph_from(vec![
            TxNode::new(1).write("a").read("b"),
            TxNode::new(1).write("b").read("a"),
            TxNode::new(1).read("a"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 2);
    }

    #[test]
    fn test_bucketed_detection_matches_whole_graph() {
        let graph = graph_from(vec![
            TxNode::new(1).write("a").read("b"),
            TxNode::new(1).write("b").read("a"),
            TxNode::new(1).write("c").read("d"),
            TxNode::new(1).write("d").read("c"),
        ]);

        let mut from_buckets: Vec<BTreeSet<HyperVertexId>> = Vec::new();
        for bucket in graph.scc_candidates() {
            from_buckets.extend(find_sccs(&graph, &bucket, SccAlgorithm::Tarjan));
        }
        let mut whole = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        from_buckets.sort();
        whole.sort();
        assert_eq!(from_buckets, whole);
        assert_eq!(whole.len(), 2);
    }

    // ==================== Algorithm Agreement ====================

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_block() -> impl Strategy<Value = Vec<TxNode>> {
            prop::collection::vec(
                (
                    1u64..10,
                    prop::collection::vec("[a-e]", 0..3),
                    prop::collection::vec("[a-e]", 0..3),
                )
                    .prop_map(|(cost, reads, writes)| {
                        let mut tx = TxNode::new(cost);
                        for r in reads {
                            tx = tx.read(r);
                        }
                        for w in writes {
                            tx = tx.write(w);
                        }
                        tx
                    }),
                2..14,
            )
        }

        proptest! {
            #[test]
            fn tarjan_and_gabow_agree(txs in arb_block()) {
                let graph = graph_from(txs);
                let mut t = find_all_sccs(&graph, SccAlgorithm::Tarjan);
                let mut g = find_all_sccs(&graph, SccAlgorithm::Gabow);
                t.sort();
                g.sort();
                prop_assert_eq!(t, g);
            }

            #[test]
            fn every_scc_lives_inside_one_bucket(txs in arb_block()) {
                let graph = graph_from(txs);
                for scc in find_all_sccs(&graph, SccAlgorithm::Tarjan) {
                    let keys: BTreeSet<_> =
                        scc.iter().map(|&h| graph.bucket_key(h)).collect();
                    prop_assert_eq!(keys.len(), 1);
                }
            }
        }
    }
}
