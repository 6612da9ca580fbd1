//! Conflict-graph error types

use thiserror::Error;

/// Errors raised while building or querying the conflict graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Data-model error bubbled up from arena construction
    #[error("data model error: {0}")]
    Types(#[from] minw_types::TypesError),

    /// A hypervertex handle outside the arena
    #[error("unknown hypervertex id {0}")]
    UnknownHyperVertex(u32),
}

/// Result type for conflict-graph operations
pub type GraphResult<T> = Result<T, GraphError>;
