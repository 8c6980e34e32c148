//! # workgroup
//!
//! Composable worker pools on tokio.
//!
//! A [`Source`] produces work, a [`WorkGroup`] fans it out to a pool of
//! workers, and groups can drain one another to form pipelines with natural
//! backpressure and coordinated shutdown.
//!
//! ```no_run
//! use workgroup::{Generator, Sink, WorkGroup};
//!
//! # async fn run() -> workgroup::error::Result<()> {
//! let numbers = Generator::new(|sink: Sink<u64>| async move {
//!     for i in 0..100 {
//!         sink.send(i).await;
//!     }
//! });
//!
//! let fan_out = WorkGroup::<u64>::fan_out(8);
//! fan_out
//!     .drain(numbers)?
//!     .with(|worker, n| async move { tracing::info!(worker, n, "fan-out") })?;
//!
//! let fan_in = WorkGroup::<u64>::fan_in();
//! fan_in
//!     .drain(fan_out)?
//!     .with(|_, n| async move { tracing::info!(n, "fan-in") })?;
//! fan_in.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod source;
pub mod telemetry;

pub use config::{Options, Parallelism};
pub use engine::WorkGroup;
pub use error::{Error, Result};
pub use model::{State, Summary, TaskTiming, WorkerId};
pub use source::{Generator, IterSource, Sink, Source};
