//! Demo binary: run the full pipeline over a generated block
//!
//! Usage: `minw-demo [config.json]`

use anyhow::Result;
use minw_core::{Engine, EngineConfig, WorkloadGen, WorkloadSpec};
use minw_types::NoopStorage;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(path.as_ref())?,
        None => EngineConfig::default(),
    };
    tracing::info!(?config, "engine starting");

    let spec = WorkloadSpec {
        transactions: config.block_size,
        ..Default::default()
    };
    let engine = Engine::new(config);
    let block = WorkloadGen::new(spec, 42).block();

    let result = engine.process_block(&block)?;
    tracing::info!(
        hypervertices = result.serial_order.len(),
        edges = result.graph.edge_count(),
        components = result.sccs.len(),
        rolled_back = result.rolled_back.len(),
        rolled_back_cost = result.rolled_back_cost(),
        makespan = result.makespan(),
        serial_cost = result.serial_cost,
        "block processed"
    );

    engine.re_execute_block(&result, Arc::new(NoopStorage))?;
    tracing::info!("re-execution complete");
    Ok(())
}

/// Load an engine configuration from a JSON file
fn load_config(path: &Path) -> Result<EngineConfig> {
    tracing::info!("loading config from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&content)?;
    Ok(config)
}
