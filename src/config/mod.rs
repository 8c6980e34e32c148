//! Typed configuration for work groups.
//!
//! Options can be built in code, loaded from environment variables, or read
//! from a `[workgroup]` table in a TOML file. Whatever the origin, they are
//! normalized against the host's parallelism when a group is constructed.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Idle timeout used when none (or zero) is requested.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Monitor queue capacity used when none is requested.
pub const DEFAULT_MONITOR_CAPACITY: usize = 64;

/// Upper bound on workers, as a multiple of the compute-unit count.
pub const MAX_WORKERS_PER_CORE: usize = 100;

/// Number of compute units available to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parallelism(usize);

impl Parallelism {
    /// An explicit compute-unit count. Zero is treated as one.
    pub fn new(units: usize) -> Self {
        Self(units.max(1))
    }

    /// The host's compute-unit count, sampled once per process.
    pub fn host() -> Self {
        static HOST: OnceLock<usize> = OnceLock::new();
        Self::new(*HOST.get_or_init(num_cpus::get))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Parameters for constructing a [`WorkGroup`](crate::engine::WorkGroup).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Number of concurrent workers. Zero means "one per compute unit".
    pub workers: usize,
    /// Display name used in diagnostics.
    pub name: String,
    /// How long a worker waits for work before logging an idle timeout.
    pub timeout: Duration,
    /// Measure each task and publish it on the monitor queue.
    pub timing: bool,
    /// Capacity of the monitor queue when `timing` is enabled.
    pub monitor_capacity: usize,
}

impl Options {
    pub fn workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timing(mut self, timing: bool) -> Self {
        self.timing = timing;
        self
    }

    pub fn monitor_capacity(mut self, capacity: usize) -> Self {
        self.monitor_capacity = capacity;
        self
    }

    /// Apply defaults against the given parallelism.
    ///
    /// A worker count of zero or above `100 × parallelism` falls back to the
    /// parallelism itself; it is not clamped to the maximum.
    pub fn normalize(mut self, parallelism: Parallelism) -> Self {
        let units = parallelism.get();
        if self.workers == 0 || self.workers > MAX_WORKERS_PER_CORE * units {
            self.workers = units;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.monitor_capacity == 0 {
            self.monitor_capacity = DEFAULT_MONITOR_CAPACITY;
        }
        self
    }

    /// Load options from `WORKGROUP_*` environment variables.
    ///
    /// Every variable is optional. In local dev, call `dotenvy::dotenv().ok()`
    /// before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            workers: optional_var("WORKGROUP_WORKERS")?.unwrap_or_default(),
            name: std::env::var("WORKGROUP_NAME").unwrap_or_default(),
            timeout: optional_var("WORKGROUP_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or_default(),
            timing: optional_var("WORKGROUP_TIMING")?.unwrap_or_default(),
            monitor_capacity: optional_var("WORKGROUP_MONITOR_CAPACITY")?.unwrap_or_default(),
        })
    }

    /// Parse options from the `[workgroup]` table of a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: OptionsFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad workgroup config: {e}")))?;
        Ok(file.workgroup.into())
    }

    /// Read and parse a TOML options file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct OptionsFile {
    #[serde(default)]
    workgroup: OptionsTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsTable {
    #[serde(default)]
    workers: usize,
    #[serde(default)]
    name: String,
    #[serde(default)]
    timeout_ms: u64,
    #[serde(default)]
    timing: bool,
    #[serde(default)]
    monitor_capacity: usize,
}

impl From<OptionsTable> for Options {
    fn from(table: OptionsTable) -> Self {
        Self {
            workers: table.workers,
            name: table.name,
            timeout: Duration::from_millis(table.timeout_ms),
            timing: table.timing,
            monitor_capacity: table.monitor_capacity,
        }
    }
}

fn optional_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {name} ({raw:?}): {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_falls_back_to_parallelism() {
        let opts = Options::default().normalize(Parallelism::new(6));
        assert_eq!(opts.workers, 6);
        assert_eq!(opts.timeout, DEFAULT_TIMEOUT);
        assert_eq!(opts.monitor_capacity, DEFAULT_MONITOR_CAPACITY);
    }

    #[test]
    fn worker_ceiling_is_inclusive() {
        let at_max = Options::workers(400).normalize(Parallelism::new(4));
        assert_eq!(at_max.workers, 400);

        let over = Options::workers(401).normalize(Parallelism::new(4));
        assert_eq!(over.workers, 4);
    }

    #[test]
    fn explicit_timeout_is_kept() {
        let opts = Options::default()
            .timeout(Duration::from_millis(250))
            .normalize(Parallelism::new(1));
        assert_eq!(opts.timeout, Duration::from_millis(250));
    }

    #[test]
    fn zero_parallelism_is_one_unit() {
        assert_eq!(Parallelism::new(0).get(), 1);
        assert!(Parallelism::host().get() >= 1);
    }
}
