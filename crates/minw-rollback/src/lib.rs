//! Greedy minimum-weight rollback selection
//!
//! Given one strongly connected component of the conflict graph, repeatedly
//! removes the hypervertex with the cheapest rollback cost until the
//! component is acyclic, updating neighbor costs incrementally rather than
//! recomputing the whole component.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod selector;

pub use error::{RollbackError, RollbackResult};
pub use selector::{select_rollback, RollbackPlan};
