//! Conflict graph construction and reachability labeling
//!
//! Edges are aggregated at hypervertex granularity but keep the vertex
//! pairs that caused them, so rollback selection can work with exact
//! cascade sets. Labels are decrease-only minima over hypervertex ids;
//! every label change atomically re-homes the hypervertex in the
//! `(min_in, min_out)` bucket map.

use crate::{GraphError, GraphResult};
use minw_types::{HyperVertexId, RollbackType, TxArena, VertexId, UNSET_LABEL};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Bucket key: two labels packed into one value.
///
/// Hypervertices can only be mutually reachable if they agree on both
/// labels, so sharing a packed key is the SCC-candidate pre-filter.
pub fn combine(min_in: u32, min_out: u32) -> u64 {
    min_in as u64 * 1_000_001 + min_out as u64
}

/// Per-hypervertex conflict state, kept in a side table parallel to the
/// hypervertex arena
#[derive(Clone, Debug)]
pub struct HvConflict {
    /// Minimum hypervertex id reachable backward over incoming edges
    pub min_in: u32,
    /// Minimum hypervertex id reachable forward over outgoing edges
    pub min_out: u32,
    /// Hypervertices this one has an outgoing conflict edge to
    pub out_hv: BTreeSet<HyperVertexId>,
    /// Hypervertices with a conflict edge into this one
    pub in_hv: BTreeSet<HyperVertexId>,
    /// Per-partner (reader vertex, writer vertex) pairs behind each edge
    pub out_edges: BTreeMap<HyperVertexId, BTreeSet<(VertexId, VertexId)>>,
    /// Per-partner cascade sets this hypervertex would free by rolling
    /// back toward that partner
    pub out_rollback: BTreeMap<HyperVertexId, BTreeSet<VertexId>>,
}

impl HvConflict {
    fn new() -> Self {
        Self {
            min_in: UNSET_LABEL,
            min_out: UNSET_LABEL,
            out_hv: BTreeSet::new(),
            in_hv: BTreeSet::new(),
            out_edges: BTreeMap::new(),
            out_rollback: BTreeMap::new(),
        }
    }
}

/// The conflict-graph context: owns the transaction arena, the per-
/// hypervertex conflict side table, and the reachability bucket map
#[derive(Debug)]
pub struct ConflictGraph {
    arena: TxArena,
    hv: Vec<HvConflict>,
    buckets: HashMap<u64, BTreeSet<HyperVertexId>>,
    edge_count: u64,
}

impl ConflictGraph {
    /// Wrap a fully-constructed arena
    pub fn new(arena: TxArena) -> Self {
        let hv = (0..arena.hyper_count()).map(|_| HvConflict::new()).collect();
        Self {
            arena,
            hv,
            buckets: HashMap::new(),
            edge_count: 0,
        }
    }

    /// The underlying transaction arena
    pub fn arena(&self) -> &TxArena {
        &self.arena
    }

    /// Conflict state of one hypervertex
    pub fn conflict(&self, hid: HyperVertexId) -> GraphResult<&HvConflict> {
        self.hv
            .get(hid.index())
            .ok_or(GraphError::UnknownHyperVertex(hid.as_u32()))
    }

    /// Number of distinct hypervertex-pair edges inserted so far
    pub fn edge_count(&self) -> u64 {
        self.edge_count
    }

    /// Derive the (reader, writer) vertex pair list from the inverted
    /// index.
    ///
    /// For every key with at least one writer, each reader conflicts with
    /// each writer; pairs within one hypervertex are dropped and the list
    /// is deduplicated, so a pair sharing several keys yields one edge.
    pub fn conflict_pairs(&self) -> Vec<(VertexId, VertexId)> {
        let mut pairs = BTreeSet::new();
        self.arena.inverted_index().for_each(|_, acc| {
            if acc.writers.is_empty() {
                return;
            }
            for &reader in &acc.readers {
                for &writer in &acc.writers {
                    if reader == writer {
                        continue;
                    }
                    if self.arena.vertex(reader).hyper_id == self.arena.vertex(writer).hyper_id {
                        continue;
                    }
                    pairs.insert((reader, writer));
                }
            }
        });
        pairs.into_iter().collect()
    }

    /// Build the whole graph serially from the inverted index
    pub fn build(&mut self) {
        let pairs = self.conflict_pairs();
        debug!(pairs = pairs.len(), "building conflict graph");
        for (reader, writer) in pairs {
            self.insert_edge(reader, writer);
        }
    }

    /// Insert one read-write conflict: the reader must be ordered before
    /// the writer, so the edge runs reader -> writer at hypervertex level.
    ///
    /// Idempotent: re-inserting a known vertex pair is a no-op.
    pub fn insert_edge(&mut self, reader: VertexId, writer: VertexId) {
        let r_hv = self.arena.vertex(reader).hyper_id;
        let w_hv = self.arena.vertex(writer).hyper_id;
        if r_hv == w_hv {
            return;
        }

        let newly_inserted = self.hv[r_hv.index()]
            .out_edges
            .entry(w_hv)
            .or_default()
            .insert((reader, writer));
        if !newly_inserted {
            return;
        }
        self.edge_count += 1;

        self.arena.add_degree(reader, 1);
        self.arena.add_degree(writer, 1);

        let reader_cascade = self.arena.vertex(reader).cascade.clone();
        {
            let r = &mut self.hv[r_hv.index()];
            r.out_hv.insert(w_hv);
            r.out_rollback.entry(w_hv).or_default().extend(reader_cascade);
        }
        self.hv[w_hv.index()].in_hv.insert(r_hv);

        // Reachability labels: a label is the minimum hypervertex id
        // reachable on that side, and only ever decreases
        let cand_out = self.hv[w_hv.index()].min_out.min(w_hv.as_u32());
        if cand_out < self.hv[r_hv.index()].min_out {
            self.propagate(r_hv, cand_out, RollbackType::Out);
        }
        let cand_in = self.hv[r_hv.index()].min_in.min(r_hv.as_u32());
        if cand_in < self.hv[w_hv.index()].min_in {
            self.propagate(w_hv, cand_in, RollbackType::In);
        }
    }

    /// Worklist label propagation: apply `value` to `start`'s label on
    /// `side`, then keep improving upstream neighbors that can now reach
    /// the same minimum
    fn propagate(&mut self, start: HyperVertexId, value: u32, side: RollbackType) {
        let mut work = vec![start];
        while let Some(h) = work.pop() {
            let state = &self.hv[h.index()];
            let current = match side {
                RollbackType::Out => state.min_out,
                RollbackType::In => state.min_in,
            };
            if value >= current {
                continue;
            }

            // Re-bucket atomically with the label write; a hypervertex
            // only occupies a bucket once both labels are set
            if state.min_in != UNSET_LABEL && state.min_out != UNSET_LABEL {
                let old_key = combine(state.min_in, state.min_out);
                if let Some(members) = self.buckets.get_mut(&old_key) {
                    members.remove(&h);
                    if members.is_empty() {
                        self.buckets.remove(&old_key);
                    }
                }
            }
            let (new_in, new_out) = match side {
                RollbackType::Out => (state.min_in, value),
                RollbackType::In => (value, state.min_out),
            };
            {
                let state = &mut self.hv[h.index()];
                state.min_in = new_in;
                state.min_out = new_out;
            }
            if new_in != UNSET_LABEL && new_out != UNSET_LABEL {
                self.buckets
                    .entry(combine(new_in, new_out))
                    .or_default()
                    .insert(h);
            }

            let neighbors: Vec<HyperVertexId> = match side {
                RollbackType::Out => self.hv[h.index()].in_hv.iter().copied().collect(),
                RollbackType::In => self.hv[h.index()].out_hv.iter().copied().collect(),
            };
            for n in neighbors {
                let label = match side {
                    RollbackType::Out => self.hv[n.index()].min_out,
                    RollbackType::In => self.hv[n.index()].min_in,
                };
                if value < label {
                    work.push(n);
                }
            }
        }
    }

    /// Buckets holding more than one hypervertex: the only places an SCC
    /// can hide
    pub fn scc_candidates(&self) -> Vec<BTreeSet<HyperVertexId>> {
        let mut keys: Vec<u64> = self
            .buckets
            .iter()
            .filter(|(_, m)| m.len() > 1)
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|k| self.buckets[&k].clone()).collect()
    }

    /// Current bucket key of a hypervertex, if both labels are set
    pub fn bucket_key(&self, hid: HyperVertexId) -> Option<u64> {
        let state = &self.hv[hid.index()];
        (state.min_in != UNSET_LABEL && state.min_out != UNSET_LABEL)
            .then(|| combine(state.min_in, state.min_out))
    }

    /// Check that every hypervertex sits in exactly the bucket its labels
    /// demand; used by tests
    pub fn buckets_consistent(&self) -> bool {
        for idx in 0..self.hv.len() {
            let hid = HyperVertexId::from(idx);
            match self.bucket_key(hid) {
                Some(key) => {
                    if !self.buckets.get(&key).is_some_and(|m| m.contains(&hid)) {
                        return false;
                    }
                    // no other bucket may hold it
                    for (k, members) in &self.buckets {
                        if *k != key && members.contains(&hid) {
                            return false;
                        }
                    }
                }
                None => {
                    if self.buckets.values().any(|m| m.contains(&hid)) {
                        return false;
                    }
                }
            }
        }
        true
    }
}
