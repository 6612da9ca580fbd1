//! The block pipeline
//!
//! Ties the phases together: arena construction, parallel conflict-graph
//! build, bucketed SCC detection, per-component rollback selection, serial
//! order merging, time-space scheduling with compaction, and re-execution
//! of the rolled-back vertices.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use minw_graph::{find_sccs, ConflictGraph};
use minw_pool::{wait_all, TaskPool};
use minw_rollback::{select_rollback, RollbackPlan};
use minw_schedule::{re_execute, Schedule, TimeSpaceGraph};
use minw_types::{HyperVertexId, StorageAdapter, TxArena, TxNode, VertexId};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the pipeline produced for one block
#[derive(Debug)]
pub struct BlockResult {
    /// The conflict graph, owning the transaction arena
    pub graph: Arc<ConflictGraph>,
    /// Strongly connected components found in the reachability buckets
    pub sccs: Vec<BTreeSet<HyperVertexId>>,
    /// One rollback plan per component
    pub plans: Vec<RollbackPlan>,
    /// Rolled-back vertices in replay order
    pub rolled_back: Vec<VertexId>,
    /// Cycle-free serialization of every hypervertex in the block
    pub serial_order: Vec<HyperVertexId>,
    /// Re-execution schedule over the rolled-back vertices
    pub schedule: Schedule,
    /// Cost of running every vertex in the block back to back
    pub serial_cost: u64,
}

impl BlockResult {
    /// Latest finish time of the re-execution schedule
    pub fn makespan(&self) -> u64 {
        self.schedule.makespan
    }

    /// Total self cost of the rolled-back vertices
    pub fn rolled_back_cost(&self) -> u64 {
        let arena = self.graph.arena();
        self.rolled_back
            .iter()
            .map(|&v| arena.vertex(v).self_cost)
            .sum()
    }
}

/// The MinW engine: a worker pool plus the block pipeline
pub struct Engine {
    config: EngineConfig,
    pool: Arc<TaskPool>,
}

impl Engine {
    /// Create an engine and spawn its worker pool
    pub fn new(config: EngineConfig) -> Self {
        let pool = Arc::new(TaskPool::new(config.workers));
        Self { config, pool }
    }

    /// The active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline over one block of transaction trees
    pub fn process_block(&self, txs: &[TxNode]) -> EngineResult<BlockResult> {
        let mut arena = TxArena::new();
        for tx in txs {
            arena.add_transaction(tx)?;
        }
        let serial_cost = arena
            .hypers()
            .iter()
            .flat_map(|h| h.vertices.iter())
            .map(|&v| arena.vertex(v).self_cost)
            .sum();

        let graph = Arc::new(self.build_graph(arena)?);
        info!(
            hypervertices = graph.arena().hyper_count(),
            vertices = graph.arena().vertex_count(),
            edges = graph.edge_count(),
            "conflict graph built"
        );

        let sccs: Vec<BTreeSet<HyperVertexId>> = graph
            .scc_candidates()
            .iter()
            .flat_map(|bucket| find_sccs(&graph, bucket, self.config.scc_algorithm))
            .collect();
        debug!(candidates = sccs.len(), "scc detection done");

        let plans = self.break_sccs(&graph, &sccs)?;
        let (serial_order, order_index) = merge_serial_order(&graph, &plans);
        let rolled_back = collect_rollback(graph.arena(), &plans, &order_index);

        let mut timeline = TimeSpaceGraph::new(graph.arena(), rolled_back.clone());
        timeline.reschedule_transactions(self.config.compaction_ratio);
        let schedule = timeline.finish();
        info!(
            rolled_back = rolled_back.len(),
            makespan = schedule.makespan,
            serial_cost,
            "block processed"
        );

        Ok(BlockResult {
            graph,
            sccs,
            plans,
            rolled_back,
            serial_order,
            schedule,
            serial_cost,
        })
    }

    /// Batch a transaction stream into blocks of `block_size` and run the
    /// pipeline over each
    pub fn process_all(&self, txs: &[TxNode]) -> EngineResult<Vec<BlockResult>> {
        txs.chunks(self.config.block_size.max(1))
            .map(|block| self.process_block(block))
            .collect()
    }

    /// Re-run the rolled-back vertices of a processed block against
    /// `storage`, honoring the schedule's dependency graph
    pub fn re_execute_block(
        &self,
        result: &BlockResult,
        storage: Arc<dyn StorageAdapter>,
    ) -> EngineResult<()> {
        re_execute(result.graph.arena(), &result.schedule, &self.pool, storage)?;
        Ok(())
    }

    /// Build the conflict graph. A large pair list is chunked across the
    /// pool and each chunk merges into the graph under one lock
    /// acquisition; labels converge to the same fixpoint in any insertion
    /// order, so the result matches the serial build
    fn build_graph(&self, arena: TxArena) -> EngineResult<ConflictGraph> {
        let mut graph = ConflictGraph::new(arena);
        let pairs = graph.conflict_pairs();

        if self.pool.workers() == 1 || pairs.len() < self.config.parallel_edge_threshold {
            for (reader, writer) in pairs {
                graph.insert_edge(reader, writer);
            }
            return Ok(graph);
        }

        let slots = self.pool.workers() * 4;
        let chunk = (pairs.len() + slots - 1) / slots;
        let shared = Arc::new(Mutex::new(graph));
        let mut handles = Vec::new();
        for batch in pairs.chunks(chunk.max(1)) {
            let batch = batch.to_vec();
            let shared = Arc::clone(&shared);
            handles.push(self.pool.submit(move || {
                // one lock acquisition per batch; label propagation runs
                // while the batch holds the graph
                let mut graph = shared.lock();
                for (reader, writer) in batch {
                    graph.insert_edge(reader, writer);
                }
            })?);
        }
        wait_all(handles)?;

        // every batch has run to completion, so the graph can be swapped
        // out from under any worker-held Arc clones
        let graph = std::mem::replace(&mut *shared.lock(), ConflictGraph::new(TxArena::new()));
        Ok(graph)
    }

    /// Run rollback selection for every component on the pool
    fn break_sccs(
        &self,
        graph: &Arc<ConflictGraph>,
        sccs: &[BTreeSet<HyperVertexId>],
    ) -> EngineResult<Vec<RollbackPlan>> {
        if sccs.is_empty() {
            return Ok(Vec::new());
        }
        let fast_mode = self.config.fast_mode;
        let mut handles = Vec::new();
        for scc in sccs {
            let graph = Arc::clone(graph);
            let scc = scc.clone();
            handles.push(
                self.pool
                    .submit(move || select_rollback(&graph, &scc, fast_mode))?,
            );
        }
        let results = wait_all(handles)?;
        let mut plans = Vec::with_capacity(results.len());
        for result in results {
            plans.push(result?);
        }
        Ok(plans)
    }
}

/// Splice every component's serialization into the block-wide id order.
///
/// Hypervertices outside any component keep their id position; the first
/// member of a component encountered stands for the whole component, which
/// is emitted in its plan's order.
fn merge_serial_order(
    graph: &ConflictGraph,
    plans: &[RollbackPlan],
) -> (Vec<HyperVertexId>, HashMap<HyperVertexId, usize>) {
    let mut plan_of: HashMap<HyperVertexId, usize> = HashMap::new();
    for (i, plan) in plans.iter().enumerate() {
        for &h in &plan.serial_order {
            plan_of.insert(h, i);
        }
    }

    let mut order = Vec::with_capacity(graph.arena().hyper_count());
    let mut emitted: BTreeSet<HyperVertexId> = BTreeSet::new();
    for idx in 0..graph.arena().hyper_count() {
        let h = HyperVertexId::from(idx);
        if emitted.contains(&h) {
            continue;
        }
        match plan_of.get(&h) {
            Some(&i) => {
                for &member in &plans[i].serial_order {
                    if emitted.insert(member) {
                        order.push(member);
                    }
                }
            }
            None => {
                emitted.insert(h);
                order.push(h);
            }
        }
    }
    let index = order.iter().enumerate().map(|(i, &h)| (h, i)).collect();
    (order, index)
}

/// Union the plans' vertex sets and sort into replay order: serial position
/// of the owning hypervertex ascending, then hierarchical id descending so
/// nested children come before their parents
fn collect_rollback(
    arena: &TxArena,
    plans: &[RollbackPlan],
    order_index: &HashMap<HyperVertexId, usize>,
) -> Vec<VertexId> {
    let mut set: BTreeSet<VertexId> = BTreeSet::new();
    for plan in plans {
        set.extend(plan.vertices.iter().copied());
    }
    let mut list: Vec<VertexId> = set.into_iter().collect();
    list.sort_by(|&a, &b| {
        let va = arena.vertex(a);
        let vb = arena.vertex(b);
        order_index[&va.hyper_id]
            .cmp(&order_index[&vb.hyper_id])
            .then_with(|| vb.id.cmp(&va.id))
    });
    list
}
