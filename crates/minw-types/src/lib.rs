//! Core data model for the MinW conflict-graph engine
//!
//! This crate defines the nested-transaction data model shared by every
//! phase of the engine: integer-id handles, the `TxNode` input tree, the
//! `Vertex`/`HyperVertex` arenas, and the concurrent inverted index that
//! feeds conflict-graph construction.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod arena;
mod error;
mod ids;
mod index;
mod storage;
mod tx;

pub use arena::{HyperVertex, TxArena, Vertex, UNSET_LABEL};
pub use error::{TypesError, TypesResult};
pub use ids::{DepKind, HyperVertexId, RollbackType, VertexId};
pub use index::{InvertedIndex, KeyAccessors};
pub use storage::{NoopStorage, StorageAdapter};
pub use tx::TxNode;
