//! The greedy MinW selection loop
//!
//! Cost model: for each hypervertex and each edge side, sum the `self_cost`
//! of the vertices its rollback would free and divide by the sum of their
//! conflict degrees ("cost per conflict resolved"); a zero degree sum falls
//! back to the raw numerator. The global minimum is removed each round;
//! neighbors are updated by subtracting the removed hypervertex's
//! per-partner contribution and decrementing rollback-set reference counts.

use crate::{RollbackError, RollbackResult};
use minw_graph::ConflictGraph;
use minw_types::{HyperVertexId, RollbackType, VertexId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Outcome of breaking one SCC
#[derive(Clone, Debug, Default)]
pub struct RollbackPlan {
    /// Every vertex that must be aborted and re-executed
    pub vertices: BTreeSet<VertexId>,
    /// Hypervertices whose rollback side was picked and rolled back.
    /// Members whose accumulators empty during cascade leave the component
    /// for free and are not listed here.
    pub aborted: BTreeSet<HyperVertexId>,
    /// Dependency-consistent replay order over every component member:
    /// IN-type removals first (queue), then the survivor, then OUT-type
    /// removals in reverse removal order (stack)
    pub serial_order: Vec<HyperVertexId>,
}

/// f64 cost with a total order, so it can key the selection queue
#[derive(Clone, Copy, Debug)]
struct CostKey(f64);

impl PartialEq for CostKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for CostKey {}
impl PartialOrd for CostKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for CostKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Refcounted rollback multiset plus its cost accumulators for one side
#[derive(Clone, Debug, Default)]
struct SideState {
    refs: BTreeMap<VertexId, u32>,
    cost_sum: f64,
    degree_sum: u64,
}

impl SideState {
    fn add(&mut self, v: VertexId, self_cost: u64, degree: u64) {
        let count = self.refs.entry(v).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.cost_sum += self_cost as f64;
            self.degree_sum += degree;
        }
    }

    /// Decrement the refcount; on reaching zero the vertex leaves the
    /// accumulators. Returns true if the side is now empty.
    fn remove(&mut self, v: VertexId, self_cost: u64, degree: u64) -> bool {
        if let Some(count) = self.refs.get_mut(&v) {
            *count -= 1;
            if *count == 0 {
                self.refs.remove(&v);
                self.cost_sum -= self_cost as f64;
                self.degree_sum -= degree;
            }
        }
        self.refs.is_empty()
    }

    fn cost(&self) -> f64 {
        if self.degree_sum == 0 {
            self.cost_sum
        } else {
            self.cost_sum / self.degree_sum as f64
        }
    }

    fn vertices(&self) -> BTreeSet<VertexId> {
        self.refs.keys().copied().collect()
    }
}

/// Working state of one hypervertex inside the shrinking component
#[derive(Clone, Debug)]
struct HvWork {
    in_side: SideState,
    out_side: SideState,
    in_nbrs: BTreeSet<HyperVertexId>,
    out_nbrs: BTreeSet<HyperVertexId>,
    cost: f64,
    rollback_type: RollbackType,
}

impl HvWork {
    fn side(&self, side: RollbackType) -> &SideState {
        match side {
            RollbackType::In => &self.in_side,
            RollbackType::Out => &self.out_side,
        }
    }

    /// Recompute cost and rollback type from the current accumulators
    fn revise(&mut self) {
        let in_cost = self.in_side.cost();
        let out_cost = self.out_side.cost();
        if in_cost < out_cost {
            self.cost = in_cost;
            self.rollback_type = RollbackType::In;
        } else {
            self.cost = out_cost;
            self.rollback_type = RollbackType::Out;
        }
    }
}

/// Break one SCC: returns the rollback vertex set and a serialization
/// order. With `fast_mode` the per-round cost revision is skipped and
/// hypervertices keep the cost computed when the component was entered.
pub fn select_rollback(
    graph: &ConflictGraph,
    scc: &BTreeSet<HyperVertexId>,
    fast_mode: bool,
) -> RollbackResult<RollbackPlan> {
    if scc.len() < 2 {
        return Err(RollbackError::SccTooSmall(scc.len()));
    }

    let mut members = scc.clone();
    let mut work = init_work(graph, scc)?;
    let mut pq: BTreeSet<(CostKey, HyperVertexId)> = work
        .iter()
        .map(|(&h, w)| (CostKey(w.cost), h))
        .collect();

    let mut plan = RollbackPlan::default();
    let mut queue_order: Vec<HyperVertexId> = Vec::new();
    let mut stack_order: Vec<HyperVertexId> = Vec::new();

    while members.len() > 1 {
        let &(key, rb) = pq.iter().next().expect("queue tracks members");
        pq.remove(&(key, rb));
        members.remove(&rb);

        let side = work[&rb].rollback_type;
        plan.vertices.extend(work[&rb].side(side).vertices());
        plan.aborted.insert(rb);
        match side {
            RollbackType::Out => stack_order.push(rb),
            RollbackType::In => queue_order.push(rb),
        }
        debug!(hv = %rb, cost = key.0, ?side, "rollback pick");

        let mut touched: BTreeSet<HyperVertexId> = BTreeSet::new();
        let mut removed = vec![rb];
        while let Some(dead) = removed.pop() {
            let (dead_out, dead_in) = {
                let w = &work[&dead];
                (w.out_nbrs.clone(), w.in_nbrs.clone())
            };

            // out-neighbors lose mass on their IN side
            for n in dead_out {
                if !members.contains(&n) {
                    continue;
                }
                let contribution = graph
                    .conflict(dead)?
                    .out_rollback
                    .get(&n)
                    .cloned()
                    .unwrap_or_default();
                let entry = work.get_mut(&n).expect("member state");
                entry.in_nbrs.remove(&dead);
                let mut emptied = false;
                for v in contribution {
                    let vx = graph.arena().vertex(v);
                    emptied = entry.in_side.remove(v, vx.self_cost, vx.degree);
                }
                touched.insert(n);
                if emptied && members.len() > 1 {
                    // no incoming mass left: the neighbor cannot sit on a
                    // cycle anymore, it leaves the component without being
                    // rolled back
                    queue_order.push(n);
                    delete_member(&mut members, &mut pq, &work, n);
                    removed.push(n);
                    touched.remove(&n);
                }
            }

            // in-neighbors lose mass on their OUT side
            for n in dead_in {
                if !members.contains(&n) {
                    continue;
                }
                let contribution = graph
                    .conflict(n)?
                    .out_rollback
                    .get(&dead)
                    .cloned()
                    .unwrap_or_default();
                let entry = work.get_mut(&n).expect("member state");
                entry.out_nbrs.remove(&dead);
                let mut emptied = false;
                for v in contribution {
                    let vx = graph.arena().vertex(v);
                    emptied = entry.out_side.remove(v, vx.self_cost, vx.degree);
                }
                touched.insert(n);
                if emptied && members.len() > 1 {
                    stack_order.push(n);
                    delete_member(&mut members, &mut pq, &work, n);
                    removed.push(n);
                    touched.remove(&n);
                }
            }
        }

        if !fast_mode {
            // cost revision is local: only neighbors whose accumulators
            // changed get a new queue position
            for n in touched {
                if !members.contains(&n) {
                    continue;
                }
                let entry = work.get_mut(&n).expect("member state");
                let old_key = CostKey(entry.cost);
                entry.revise();
                if pq.remove(&(old_key, n)) {
                    pq.insert((CostKey(entry.cost), n));
                }
            }
        }
    }

    plan.serial_order.extend(queue_order);
    if let Some(&survivor) = members.iter().next() {
        plan.serial_order.push(survivor);
    }
    while let Some(h) = stack_order.pop() {
        plan.serial_order.push(h);
    }
    Ok(plan)
}

fn delete_member(
    members: &mut BTreeSet<HyperVertexId>,
    pq: &mut BTreeSet<(CostKey, HyperVertexId)>,
    work: &HashMap<HyperVertexId, HvWork>,
    n: HyperVertexId,
) {
    members.remove(&n);
    pq.remove(&(CostKey(work[&n].cost), n));
}

/// Seed the working state: per-partner rollback sets of edges that stay
/// inside the SCC feed the refcounted accumulators of both endpoints
fn init_work(
    graph: &ConflictGraph,
    scc: &BTreeSet<HyperVertexId>,
) -> RollbackResult<HashMap<HyperVertexId, HvWork>> {
    let mut work: HashMap<HyperVertexId, HvWork> = scc
        .iter()
        .map(|&h| {
            (
                h,
                HvWork {
                    in_side: SideState::default(),
                    out_side: SideState::default(),
                    in_nbrs: BTreeSet::new(),
                    out_nbrs: BTreeSet::new(),
                    cost: 0.0,
                    rollback_type: RollbackType::Out,
                },
            )
        })
        .collect();

    for &h in scc {
        let conflict = graph.conflict(h)?;
        for (&partner, rollback) in &conflict.out_rollback {
            if !scc.contains(&partner) {
                continue;
            }
            for &v in rollback {
                let vx = graph.arena().vertex(v);
                let (self_cost, degree) = (vx.self_cost, vx.degree);
                work.get_mut(&h)
                    .expect("member state")
                    .out_side
                    .add(v, self_cost, degree);
                work.get_mut(&partner)
                    .expect("member state")
                    .in_side
                    .add(v, self_cost, degree);
            }
            work.get_mut(&h).expect("member state").out_nbrs.insert(partner);
            work.get_mut(&partner)
                .expect("member state")
                .in_nbrs
                .insert(h);
        }
    }

    for w in work.values_mut() {
        w.revise();
    }
    Ok(work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minw_graph::{find_all_sccs, SccAlgorithm};
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

    /// DFS cycle check over out-edges restricted to `members`
    fn is_acyclic(graph: &ConflictGraph, members: &BTreeSet<HyperVertexId>) -> bool {
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;
        let mut state: HashMap<HyperVertexId, u8> = HashMap::new();
        for &start in members {
            if state.contains_key(&start) {
                continue;
            }
            let mut stack = vec![(start, false)];
            while let Some((v, closing)) = stack.pop() {
                if closing {
                    state.insert(v, BLACK);
                    continue;
                }
                if state.contains_key(&v) {
                    continue;
                }
                state.insert(v, GRAY);
                stack.push((v, true));
                let out = graph.conflict(v).unwrap().out_hv.clone();
                for n in out.into_iter().filter(|n| members.contains(n)) {
                    match state.get(&n) {
                        Some(&GRAY) => return false,
                        Some(_) => {}
                        None => stack.push((n, false)),
                    }
                }
            }
        }
        true
    }

    fn hid(i: u32) -> HyperVertexId {
        HyperVertexId::new(i)
    }

    // ==================== Basic Selection ====================

    #[test]
    fn test_two_cycle_rolls_back_one() {
        let graph = graph_from(vec![
            TxNode::new(10).write("a").read("b"),
            TxNode::new(1).write("b").read("a"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        assert_eq!(sccs.len(), 1);

        let plan = select_rollback(&graph, &sccs[0], false).unwrap();
        assert_eq!(plan.aborted.len(), 1);
        assert!(!plan.vertices.is_empty());

        let remaining: BTreeSet<HyperVertexId> = sccs[0]
            .difference(&plan.aborted)
            .copied()
            .collect();
        assert!(is_acyclic(&graph, &remaining));
    }

    #[test]
    fn test_three_cycle_breaks_with_one_removal() {
        // T0 w(k); T1 w(k) r(j); T2 w(j) r(k): cycle T1 <-> T2
        let graph = graph_from(vec![
            TxNode::new(3).write("k"),
            TxNode::new(2).write("k").read("j"),
            TxNode::new(1).write("j").read("k"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        assert_eq!(sccs.len(), 1);

        let plan = select_rollback(&graph, &sccs[0], false).unwrap();
        assert_eq!(plan.aborted.len(), 1);
        let remaining: BTreeSet<HyperVertexId> =
            (0..3).map(hid).filter(|h| !plan.aborted.contains(h)).collect();
        assert!(is_acyclic(&graph, &remaining));
    }

    #[test]
    fn test_serial_order_covers_component() {
        let graph = graph_from(vec![
            TxNode::new(1).write("a").read("b"),
            TxNode::new(2).write("b").read("a"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        let plan = select_rollback(&graph, &sccs[0], false).unwrap();

        // order holds every member exactly once: removed plus survivor
        let ordered: BTreeSet<HyperVertexId> = plan.serial_order.iter().copied().collect();
        assert_eq!(ordered, sccs[0]);
        assert_eq!(plan.serial_order.len(), sccs[0].len());
    }

    #[test]
    fn test_survivor_is_never_cascade_deleted() {
        // after the first pick the other member's accumulators empty, but
        // the last member standing must stay out of the aborted set
        let graph = graph_from(vec![
            TxNode::new(10).write("a").read("b"),
            TxNode::new(1).write("b").read("a"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        let plan = select_rollback(&graph, &sccs[0], false).unwrap();

        assert_eq!(plan.aborted.len(), 1);
        let survivors: Vec<HyperVertexId> =
            sccs[0].difference(&plan.aborted).copied().collect();
        assert_eq!(survivors.len(), 1);
        // the survivor still takes its slot in the replay order
        assert!(plan.serial_order.contains(&survivors[0]));
        // the cheap vertex is the one rolled back
        assert_eq!(graph.arena().total_self_cost(&plan.vertices), 1);
    }

    #[test]
    fn test_cascade_deleted_member_is_replayed_not_aborted() {
        // three-cycle h0 -> h2 -> h1 -> h0: removing h0 empties h2's IN
        // side, which drops h2 from the component without rolling it back
        let graph = graph_from(vec![
            TxNode::new(1).read("a").write("b"),
            TxNode::new(2).read("b").write("c"),
            TxNode::new(3).read("c").write("a"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 3);

        let plan = select_rollback(&graph, &sccs[0], false).unwrap();
        assert_eq!(plan.aborted.len(), 1);
        assert!(plan.aborted.contains(&hid(0)));
        // every member appears in the replay order, aborted or not
        let ordered: BTreeSet<HyperVertexId> = plan.serial_order.iter().copied().collect();
        assert_eq!(ordered, sccs[0]);
        assert_eq!(plan.serial_order.len(), sccs[0].len());
        assert_eq!(graph.arena().total_self_cost(&plan.vertices), 1);
    }

    #[test]
    fn test_tie_breaks_on_smaller_id() {
        // perfectly symmetric two-cycle
        let graph = graph_from(vec![
            TxNode::new(5).write("a").read("b"),
            TxNode::new(5).write("b").read("a"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        let plan = select_rollback(&graph, &sccs[0], false).unwrap();
        assert!(plan.aborted.contains(&hid(0)));
    }

    #[test]
    fn test_scc_too_small() {
        let graph = graph_from(vec![TxNode::new(1).write("a")]);
        let single: BTreeSet<HyperVertexId> = [hid(0)].into_iter().collect();
        assert!(matches!(
            select_rollback(&graph, &single, false),
            Err(RollbackError::SccTooSmall(1))
        ));
    }

    // ==================== Fast Mode ====================

    #[test]
    fn test_fast_mode_still_breaks_cycles() {
        let graph = graph_from(vec![
            TxNode::new(4).write("a").read("c"),
            TxNode::new(2).write("b").read("a"),
            TxNode::new(7).write("c").read("b"),
        ]);
        let sccs = find_all_sccs(&graph, SccAlgorithm::Tarjan);
        assert_eq!(sccs.len(), 1);

        let plan = select_rollback(&graph, &sccs[0], true).unwrap();
        let remaining: BTreeSet<HyperVertexId> = sccs[0]
            .difference(&plan.aborted)
            .copied()
            .collect();
        assert!(is_acyclic(&graph, &remaining));
    }

    // ==================== Properties ====================

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_block() -> impl Strategy<Value = Vec<TxNode>> {
            prop::collection::vec(
                (
                    1u64..10,
                    prop::collection::vec("[a-d]", 0..3),
                    prop::collection::vec("[a-d]", 0..3),
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
                2..10,
            )
        }

        proptest! {
            #[test]
            fn rollback_breaks_every_scc(txs in arb_block(), fast in prop::bool::ANY) {
                let graph = graph_from(txs);
                for scc in find_all_sccs(&graph, SccAlgorithm::Tarjan) {
                    let plan = select_rollback(&graph, &scc, fast).unwrap();
                    let remaining: BTreeSet<HyperVertexId> =
                        scc.difference(&plan.aborted).copied().collect();
                    prop_assert!(is_acyclic(&graph, &remaining));
                }
            }

            #[test]
            fn rollback_cost_never_exceeds_whole_scc(txs in arb_block()) {
                let graph = graph_from(txs);
                for scc in find_all_sccs(&graph, SccAlgorithm::Tarjan) {
                    let plan = select_rollback(&graph, &scc, false).unwrap();
                    let rolled = graph.arena().total_self_cost(&plan.vertices);
                    let everything: u64 = scc
                        .iter()
                        .flat_map(|&h| graph.arena().hyper(h).vertices.clone())
                        .map(|v| graph.arena().vertex(v).self_cost)
                        .sum();
                    prop_assert!(rolled <= everything);
                }
            }
        }
    }
}
