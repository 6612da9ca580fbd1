//! Data-model error types

use thiserror::Error;

/// Errors raised while building the transaction data model
#[derive(Debug, Error)]
pub enum TypesError {
    /// A STRONG dependency cycle in the input tree
    #[error("strong dependency cycle detected while building transaction {tx_id}")]
    StrongCycle {
        /// Hierarchical id of the offending node
        tx_id: String,
    },

    /// Input tree deeper than the supported nesting limit
    #[error("transaction {tx_id} exceeds maximum nesting depth {limit}")]
    NestingTooDeep {
        /// Hierarchical id of the offending node
        tx_id: String,
        /// Maximum supported depth
        limit: usize,
    },
}

/// Result type for data-model operations
pub type TypesResult<T> = Result<T, TypesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::StrongCycle {
            tx_id: "3_1".to_string(),
        };
        assert!(err.to_string().contains("3_1"));

        let err = TypesError::NestingTooDeep {
            tx_id: "0".to_string(),
            limit: 64,
        };
        assert!(err.to_string().contains("64"));
    }
}
