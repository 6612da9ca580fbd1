//! Scheduling error types

use thiserror::Error;

/// Errors raised while scheduling or re-executing rolled-back work
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A compaction move that would break the replay order
    #[error("rescheduling vertex {vertex} to {target} would violate ordering")]
    OrderViolation {
        /// Hierarchical id of the vertex
        vertex: String,
        /// Target start time of the rejected move
        target: u64,
    },

    /// Worker-pool failure during re-execution
    #[error("pool error: {0}")]
    Pool(#[from] minw_pool::PoolError),
}

/// Result type for scheduling operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;
