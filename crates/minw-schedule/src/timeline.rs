//! Per-key timeline scheduling and schedule compaction
//!
//! Vertices are processed in replay order. Each key keeps its last writer
//! and the readers seen since; a write waits for both, a read waits for
//! the last writer only. Sub-transactions of one hypervertex never
//! conflict through keys, but a STRONG parent cannot start before its
//! cascaded children finish. Compaction moves are validated against every
//! key-conflicting vertex, since the dependency chain per key reaches only
//! the latest access.

use minw_types::{HyperVertexId, TxArena, Vertex, VertexId};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Default)]
struct KeyState {
    readers: Vec<VertexId>,
    last_writer: Option<VertexId>,
}

fn key_conflict(a: &Vertex, b: &Vertex) -> bool {
    !a.write_set.is_disjoint(&b.read_set)
        || !a.write_set.is_disjoint(&b.write_set)
        || !a.read_set.is_disjoint(&b.write_set)
}

/// The time-space graph under construction
#[derive(Debug)]
pub struct TimeSpaceGraph<'a> {
    arena: &'a TxArena,
    rb_list: Vec<VertexId>,
    position: HashMap<VertexId, usize>,
    times: HashMap<VertexId, u64>,
    deps_in: HashMap<VertexId, BTreeSet<VertexId>>,
    deps_out: HashMap<VertexId, BTreeSet<VertexId>>,
    unconflict: HashMap<VertexId, BTreeSet<VertexId>>,
    conflicts: HashMap<VertexId, Vec<VertexId>>,
    siblings: HashMap<HyperVertexId, Vec<VertexId>>,
}

/// Final schedule handed to the re-execution driver
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    /// Rolled-back vertices in replay order
    pub order: Vec<VertexId>,
    /// Start time per vertex
    pub times: HashMap<VertexId, u64>,
    /// producer -> dependents, drives task-graph execution
    pub dependency_graph: HashMap<VertexId, Vec<VertexId>>,
    /// Unmet-producer count per vertex
    pub pred_counts: HashMap<VertexId, usize>,
    /// Latest finish time over all vertices
    pub makespan: u64,
}

impl<'a> TimeSpaceGraph<'a> {
    /// Build the time-space graph over `rb_list`, which must already be in
    /// replay order (serial position ascending, deeper vertices first)
    pub fn new(arena: &'a TxArena, rb_list: Vec<VertexId>) -> Self {
        let position = rb_list
            .iter()
            .enumerate()
            .map(|(i, &v)| (v, i))
            .collect();
        let mut siblings: HashMap<HyperVertexId, Vec<VertexId>> = HashMap::new();
        for &v in &rb_list {
            siblings.entry(arena.vertex(v).hyper_id).or_default().push(v);
        }
        let mut graph = Self {
            arena,
            rb_list,
            position,
            times: HashMap::new(),
            deps_in: HashMap::new(),
            deps_out: HashMap::new(),
            unconflict: HashMap::new(),
            conflicts: HashMap::new(),
            siblings,
        };
        graph.build();
        graph
    }

    fn add_dep(&mut self, producer: VertexId, consumer: VertexId, start: &mut u64) {
        if self.arena.vertex(producer).hyper_id == self.arena.vertex(consumer).hyper_id {
            return;
        }
        self.deps_in.entry(consumer).or_default().insert(producer);
        self.deps_out.entry(producer).or_default().insert(consumer);
        let finish = self.times[&producer] + self.arena.vertex(producer).self_cost;
        *start = (*start).max(finish);
    }

    fn build(&mut self) {
        let mut keys: HashMap<String, KeyState> = HashMap::new();
        let list = self.rb_list.clone();

        for &vid in &list {
            let v = self.arena.vertex(vid).clone();
            let mut start = 0u64;

            for key in &v.write_set {
                if let Some(state) = keys.get(key) {
                    let readers = state.readers.clone();
                    let writer = state.last_writer;
                    for r in readers {
                        self.add_dep(r, vid, &mut start);
                    }
                    if let Some(w) = writer {
                        self.add_dep(w, vid, &mut start);
                    }
                }
            }
            for key in v.read_set.difference(&v.write_set) {
                if let Some(state) = keys.get(key) {
                    if let Some(w) = state.last_writer {
                        self.add_dep(w, vid, &mut start);
                    }
                }
            }

            // a STRONG parent starts only after its cascaded children finish
            for &child in &v.strong_children {
                if let Some(&child_time) = self.times.get(&child) {
                    let finish = child_time + self.arena.vertex(child).self_cost;
                    start = start.max(finish);
                    self.deps_in.entry(vid).or_default().insert(child);
                    self.deps_out.entry(child).or_default().insert(vid);
                }
            }

            self.times.insert(vid, start);

            for key in &v.write_set {
                let state = keys.entry(key.clone()).or_default();
                state.last_writer = Some(vid);
                state.readers.clear();
            }
            for key in v.read_set.difference(&v.write_set) {
                keys.entry(key.clone()).or_default().readers.push(vid);
            }
        }

        self.build_conflict_maps();
    }

    /// Partition, per vertex, every other vertex into key-conflicting and
    /// non-conflicting. Non-conflicting vertices are the only legal
    /// compaction candidates; conflicting ones bound every window check.
    fn build_conflict_maps(&mut self) {
        let list = self.rb_list.clone();
        for &a in &list {
            let va = self.arena.vertex(a);
            let free = self.unconflict.entry(a).or_default();
            let mut busy = Vec::new();
            for &b in &list {
                if a == b || va.hyper_id == self.arena.vertex(b).hyper_id {
                    continue;
                }
                if key_conflict(va, self.arena.vertex(b)) {
                    busy.push(b);
                } else {
                    free.insert(b);
                }
            }
            self.conflicts.insert(a, busy);
        }
    }

    /// Whether `tx` could run in `[start, start + self_cost)` without
    /// overlapping any key-conflicting vertex or cascaded producer, and
    /// without starting before an earlier same-hypervertex sibling
    /// (siblings keep replay order)
    pub fn is_idle(&self, tx: VertexId, start: u64) -> bool {
        let end = start + self.arena.vertex(tx).self_cost;
        // dependency edges only chain through the latest access per key,
        // so the window is checked against every conflicting vertex
        if let Some(busy) = self.conflicts.get(&tx) {
            for &other in busy {
                let other_start = self.times[&other];
                let other_end = other_start + self.arena.vertex(other).self_cost;
                if !(other_start >= end || other_end <= start) {
                    return false;
                }
            }
        }
        // same-hypervertex STRONG edges never appear in the conflict map
        if let Some(deps) = self.deps_in.get(&tx) {
            for &dep in deps {
                let dep_start = self.times[&dep];
                let dep_end = dep_start + self.arena.vertex(dep).self_cost;
                if !(dep_start >= end || dep_end <= start) {
                    return false;
                }
            }
        }
        let hyper = self.arena.vertex(tx).hyper_id;
        for &s in &self.siblings[&hyper] {
            if self.position[&s] < self.position[&tx] && start < self.times[&s] {
                return false;
            }
        }
        true
    }

    /// Move `tx` to `start` and repair dependency directions: any producer
    /// now scheduled after `tx` becomes a dependent instead
    fn reschedule(&mut self, tx: VertexId, start: u64) {
        self.times.insert(tx, start);
        let producers: Vec<VertexId> = self
            .deps_in
            .get(&tx)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default();
        for p in producers {
            if self.times[&p] > start {
                if let Some(d) = self.deps_in.get_mut(&tx) {
                    d.remove(&p);
                }
                self.deps_out.entry(tx).or_default().insert(p);
                if let Some(d) = self.deps_out.get_mut(&p) {
                    d.remove(&tx);
                }
                self.deps_in.entry(p).or_default().insert(tx);
            }
        }
    }

    /// Candidates scheduled strictly later than `tx` with no key conflict,
    /// earliest first
    fn candidate_set(&self, tx: VertexId) -> Vec<VertexId> {
        let tx_time = self.times[&tx];
        let mut out: Vec<VertexId> = self
            .unconflict
            .get(&tx)
            .map(|s| {
                s.iter()
                    .copied()
                    .filter(|c| self.times[c] > tx_time)
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|c| (self.times[c], self.position[c]));
        out
    }

    /// Bounded compaction: for `ceil(ratio * len)` rounds, try to pull
    /// later non-conflicting vertices into the earliest vertex's slot,
    /// then greedily drag their former dependents along.
    ///
    /// Moves only ever decrease start times, so the makespan never grows.
    pub fn reschedule_transactions(&mut self, ratio: f64) {
        let len = self.rb_list.len();
        if len == 0 {
            return;
        }
        let mut rounds = ((ratio * len as f64).ceil() as usize).clamp(1, len);
        let mut last_time: Option<u64> = None;
        let mut i = 0;

        while i < rounds && i < len {
            let tx = self.rb_list[i];
            let tx_time = self.times[&tx];

            // a repeat of the previous slot gains nothing; spend the round
            // further down the list instead
            if last_time == Some(tx_time) {
                if rounds < len {
                    rounds += 1;
                }
                i += 1;
                continue;
            }

            let candidates = self.candidate_set(tx);
            if candidates.is_empty() {
                if rounds < len {
                    rounds += 1;
                }
                i += 1;
                continue;
            }
            last_time = Some(tx_time);

            let mut moved: BTreeSet<VertexId> = BTreeSet::new();
            for ti in candidates {
                if moved.contains(&ti) {
                    continue;
                }
                moved.insert(ti);
                if self.is_idle(ti, tx_time) {
                    let original: Vec<VertexId> = self
                        .deps_out
                        .get(&ti)
                        .map(|d| d.iter().copied().collect())
                        .unwrap_or_default();
                    debug!(vertex = %ti, target = tx_time, "compaction move");
                    self.reschedule(ti, tx_time);
                    self.pull_dependents(ti, tx_time, &mut moved, original);
                }
            }
            i += 1;
        }
    }

    /// Greedy chain compaction: after `ti` moved, try its former
    /// dependents at the anchor slot, or right after `ti` finishes
    fn pull_dependents(
        &mut self,
        ti: VertexId,
        anchor: u64,
        moved: &mut BTreeSet<VertexId>,
        original_dependents: Vec<VertexId>,
    ) {
        for tj in original_dependents {
            if moved.contains(&tj) {
                continue;
            }
            let ti_finish = self.times[&ti] + self.arena.vertex(ti).self_cost;
            let is_strong_parent = self.arena.vertex(ti).strong_parent == Some(tj);

            if !is_strong_parent && self.is_idle(tj, anchor) {
                let next: Vec<VertexId> = self
                    .deps_out
                    .get(&tj)
                    .map(|d| d.iter().copied().collect())
                    .unwrap_or_default();
                self.reschedule(tj, anchor);
                moved.insert(tj);
                self.pull_dependents(tj, anchor, moved, next);
            } else if self.times[&tj] == ti_finish {
                continue;
            } else if self.is_idle(tj, ti_finish) {
                let next: Vec<VertexId> = self
                    .deps_out
                    .get(&tj)
                    .map(|d| d.iter().copied().collect())
                    .unwrap_or_default();
                self.reschedule(tj, ti_finish);
                moved.insert(tj);
                self.pull_dependents(tj, anchor, moved, next);
            }
        }
    }

    /// Start time of a vertex
    pub fn time(&self, v: VertexId) -> u64 {
        self.times[&v]
    }

    /// Producers of a vertex
    pub fn dependencies_in(&self, v: VertexId) -> BTreeSet<VertexId> {
        self.deps_in.get(&v).cloned().unwrap_or_default()
    }

    /// Latest finish time over the whole list
    pub fn makespan(&self) -> u64 {
        self.rb_list
            .iter()
            .map(|&v| self.times[&v] + self.arena.vertex(v).self_cost)
            .max()
            .unwrap_or(0)
    }

    /// Freeze into the schedule handed to the re-execution driver
    pub fn finish(self) -> Schedule {
        let makespan = self.makespan();
        let dependency_graph: HashMap<VertexId, Vec<VertexId>> = self
            .deps_out
            .iter()
            .map(|(&p, deps)| (p, deps.iter().copied().collect()))
            .collect();
        let pred_counts = self
            .rb_list
            .iter()
            .map(|&v| (v, self.deps_in.get(&v).map_or(0, |d| d.len())))
            .collect();
        Schedule {
            order: self.rb_list,
            times: self.times,
            dependency_graph,
            pred_counts,
            makespan,
        }
    }
}
