//! Phase status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Phase has not started yet.
    Pending,
    /// Phase command is currently running.
    Running,
    /// Phase command exited with status zero.
    Succeeded,
    /// Phase command exited non-zero, crashed, or could not be spawned.
    Failed,
    /// Phase was not run because an earlier phase aborted the lifecycle.
    Skipped,
    /// Phase was interrupted by a cancellation request.
    Cancelled,
    /// Phase exceeded its time limit and was killed.
    TimedOut,
}

impl Default for PhaseStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl PhaseStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::TimedOut)
    }
}
