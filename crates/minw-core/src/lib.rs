//! MinW block pipeline
//!
//! Takes a block of nested transaction trees, finds read-write conflict
//! cycles among them, picks a minimum-weight set of transactions to roll
//! back, and schedules their re-execution in time and space.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod engine;
mod error;
mod workload;

pub use config::EngineConfig;
pub use engine::{BlockResult, Engine};
pub use error::{EngineError, EngineResult};
pub use workload::{WorkloadGen, WorkloadSpec};
