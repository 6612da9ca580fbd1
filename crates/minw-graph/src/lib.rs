//! Conflict hypergraph for the MinW engine
//!
//! Builds the read-write conflict graph over a block's hypervertices,
//! maintains incremental `(min_in, min_out)` reachability labels with their
//! bucket map, and detects strongly connected components within buckets.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod graph;
mod scc;

pub use error::{GraphError, GraphResult};
pub use graph::{combine, ConflictGraph, HvConflict};
pub use scc::{find_all_sccs, find_sccs, SccAlgorithm};
