//! Orchestration engine: work groups, their worker pools, and the drain
//! protocol that chains them into pipelines.

mod drain;
pub mod group;
pub mod pool;

pub use group::WorkGroup;
pub use pool::{BoxFuture, InitializerFn, WorkerFn};
