//! Time-space re-execution scheduling
//!
//! Computes the earliest legal start time for every rolled-back vertex
//! from per-key last-reader/last-writer chains, opportunistically compacts
//! the schedule by pulling vertices into idle slots, and drives concurrent
//! re-execution over the resulting dependency graph.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod executor;
mod timeline;

pub use error::{ScheduleError, ScheduleResult};
pub use executor::re_execute;
pub use timeline::{Schedule, TimeSpaceGraph};
