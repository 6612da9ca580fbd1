//! Engine configuration

use minw_graph::SccAlgorithm;
use serde::{Deserialize, Serialize};

/// Tunables for one engine instance.
///
/// Loadable from JSON; every field has a default so a partial file works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Transactions batched into one block before the graph is built
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Worker threads shared by graph construction, rollback selection and
    /// re-execution
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Skip per-round cost revision during rollback selection
    #[serde(default)]
    pub fast_mode: bool,
    /// Fraction of the rollback list given compaction rounds
    #[serde(default = "default_compaction_ratio")]
    pub compaction_ratio: f64,
    /// SCC algorithm run inside each reachability bucket
    #[serde(default)]
    pub scc_algorithm: SccAlgorithm,
    /// Conflict-pair count below which the graph is built serially
    #[serde(default = "default_parallel_edge_threshold")]
    pub parallel_edge_threshold: usize,
}

fn default_block_size() -> usize {
    64
}

fn default_workers() -> usize {
    4
}

fn default_compaction_ratio() -> f64 {
    0.2
}

fn default_parallel_edge_threshold() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            workers: default_workers(),
            fast_mode: false,
            compaction_ratio: default_compaction_ratio(),
            scc_algorithm: SccAlgorithm::default(),
            parallel_edge_threshold: default_parallel_edge_threshold(),
        }
    }
}
