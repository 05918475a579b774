//! Lifecycle enums for a runner and the runs it hosts.

use serde::{Deserialize, Serialize};

/// Lifecycle of a [`ProcessRunner`](crate::ProcessRunner).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    /// No async run has been started yet.
    #[default]
    Idle,
    /// An async run is executing on the worker.
    Running,
    /// Cancellation was requested; the work has not returned yet.
    CancelRequested,
    /// The last async run returned. A new one may be started.
    Completed,
    /// The worker was released. Terminal.
    Disposed,
}

impl RunnerState {
    /// Returns true while an async run is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Running | Self::CancelRequested)
    }

    /// Returns true if the runner can no longer start runs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Returns true if `process_async` would be accepted in this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed)
    }
}

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// On the caller's thread via `process`.
    Sync,
    /// On the runner's worker via `process_async`.
    Async,
}

/// What the work reports when it returns without a fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The work ran to the end.
    #[default]
    Completed,
    /// The work observed a cancellation request and stopped early.
    Cancelled,
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
