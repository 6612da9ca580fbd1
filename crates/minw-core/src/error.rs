//! Engine error type

use thiserror::Error;

/// Errors surfaced by the block pipeline
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed transaction tree
    #[error("transaction error: {0}")]
    Types(#[from] minw_types::TypesError),

    /// Conflict-graph failure
    #[error("graph error: {0}")]
    Graph(#[from] minw_graph::GraphError),

    /// Rollback-selection failure
    #[error("rollback error: {0}")]
    Rollback(#[from] minw_rollback::RollbackError),

    /// Scheduling or re-execution failure
    #[error("schedule error: {0}")]
    Schedule(#[from] minw_schedule::ScheduleError),

    /// Worker-pool failure
    #[error("pool error: {0}")]
    Pool(#[from] minw_pool::PoolError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
