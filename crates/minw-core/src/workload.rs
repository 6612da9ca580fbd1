//! Synthetic nested-transaction workloads
//!
//! Seeded generation, so a block can be reproduced from its seed alone.

use minw_types::{DepKind, TxNode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shape of a generated block
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    /// Top-level transactions per block
    pub transactions: usize,
    /// Size of the key universe
    pub keys: usize,
    /// Minimum per-unit cost
    pub min_cost: u64,
    /// Maximum per-unit cost
    pub max_cost: u64,
    /// Maximum reads per unit
    pub max_reads: usize,
    /// Maximum writes per unit
    pub max_writes: usize,
    /// Probability that a unit gets nested children
    pub nested_ratio: f64,
    /// Maximum nesting depth below the root
    pub max_depth: usize,
    /// Maximum children per nested unit
    pub max_children: usize,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            transactions: 64,
            keys: 32,
            min_cost: 1,
            max_cost: 20,
            max_reads: 3,
            max_writes: 2,
            nested_ratio: 0.3,
            max_depth: 2,
            max_children: 3,
        }
    }
}

/// Seeded transaction generator
#[derive(Debug)]
pub struct WorkloadGen {
    spec: WorkloadSpec,
    rng: StdRng,
}

impl WorkloadGen {
    /// Create a generator for `spec` seeded with `seed`
    pub fn new(spec: WorkloadSpec, seed: u64) -> Self {
        Self {
            spec,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate one block of transaction trees
    pub fn block(&mut self) -> Vec<TxNode> {
        (0..self.spec.transactions).map(|_| self.tx(0)).collect()
    }

    fn tx(&mut self, depth: usize) -> TxNode {
        let cost = self.rng.gen_range(self.spec.min_cost..=self.spec.max_cost);
        let mut node = TxNode::new(cost);
        for _ in 0..self.rng.gen_range(0..=self.spec.max_reads) {
            let key = self.key();
            node = node.read(key);
        }
        for _ in 0..self.rng.gen_range(0..=self.spec.max_writes) {
            let key = self.key();
            node = node.write(key);
        }
        if depth < self.spec.max_depth && self.rng.gen_bool(self.spec.nested_ratio) {
            for _ in 0..self.rng.gen_range(1..=self.spec.max_children) {
                let dep = if self.rng.gen_bool(0.5) {
                    DepKind::Strong
                } else {
                    DepKind::Weak
                };
                let child = self.tx(depth + 1);
                node = node.child(child, dep);
            }
        }
        node
    }

    fn key(&mut self) -> String {
        format!("k{}", self.rng.gen_range(0..self.spec.keys))
    }
}
