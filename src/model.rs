//! Core data model.
//!
//! Work itself is opaque to the engine; what the engine does own is the
//! lifecycle of a group, per-task timing measurements, and the summary
//! reported when a group completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of a worker within its group, `0..workers`.
pub type WorkerId = usize;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Constructed, worker or source still missing.
    Created,
    /// Worker and source registered; ready to start.
    Configured,
    /// Worker tasks spawned.
    Running,
    /// Consuming the upstream source and feeding the intake.
    Draining,
    /// Intake closed and every worker joined.
    Completed,
    /// Outtake closed; downstream consumers have seen the end. Terminal.
    Closed,
}

impl State {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Created, Configured)
                | (Configured, Running)
                | (Running, Draining)
                | (Draining, Completed)
                | (Completed, Closed)
        )
    }

    /// Is this a terminal state?
    ///
    /// `Completed` is terminal for groups nobody drains from.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Closed)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Created => "created",
            State::Configured => "configured",
            State::Running => "running",
            State::Draining => "draining",
            State::Completed => "completed",
            State::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Wall-time of a single worker invocation, published on the monitor queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTiming {
    pub group: String,
    pub worker: WorkerId,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// What a group did between start and completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub group: String,
    pub workers: usize,
    /// Items handed from the source to the intake.
    pub received: u64,
    /// Worker invocations that returned normally.
    pub processed: u64,
    /// Worker invocations that panicked. The item was still forwarded.
    pub panicked: u64,
    /// Per-worker initializers that panicked. Those workers still served.
    pub failed_initializers: u64,
    /// Idle-timeout events across all workers.
    pub idle_timeouts: u64,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_moves_forward() {
        use State::*;
        let path = [Created, Configured, Running, Draining, Completed, Closed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            assert!(!pair[1].can_transition_to(pair[0]));
        }
        assert!(!Completed.can_transition_to(Running));
        assert!(!Closed.can_transition_to(Running));
    }

    #[test]
    fn completed_and_closed_are_terminal() {
        assert!(State::Completed.is_terminal());
        assert!(State::Closed.is_terminal());
        assert!(!State::Draining.is_terminal());
    }
}
