//! Rollback selection error types

use thiserror::Error;

/// Errors raised during rollback selection
#[derive(Debug, Error)]
pub enum RollbackError {
    /// An SCC input that cannot contain a cycle
    #[error("scc must contain at least two hypervertices, got {0}")]
    SccTooSmall(usize),

    /// Graph lookup failure
    #[error("graph error: {0}")]
    Graph(#[from] minw_graph::GraphError),
}

/// Result type for rollback operations
pub type RollbackResult<T> = Result<T, RollbackError>;
