//! Error types for workgroup.

use thiserror::Error;

/// A one-time configuration slot on a [`WorkGroup`](crate::engine::WorkGroup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Initializer,
    Worker,
    Source,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Slot::Initializer => "initializer",
            Slot::Worker => "worker",
            Slot::Source => "source",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{group}: a worker is mandatory")]
    MissingWorker { group: String },

    #[error("{group}: a source is mandatory")]
    MissingSource { group: String },

    #[error("{group}: {slot} already configured")]
    AlreadyConfigured { group: String, slot: Slot },

    #[error("{group}: upstream failed: {source}")]
    Upstream {
        group: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{group}: source panicked while pumping")]
    SourcePanicked { group: String },

    #[error("{group}: upstream group panicked")]
    UpstreamPanicked { group: String },

    #[error("{group}: every worker exited after {forwarded} items, source abandoned")]
    WorkersExited { group: String, forwarded: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
