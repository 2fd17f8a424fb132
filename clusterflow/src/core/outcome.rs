//! Phase outcome records with factory methods.

use super::{Phase, PhaseStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code reported when a phase exceeded its time limit.
pub const EXIT_TIMED_OUT: i32 = 124;
/// Exit code reported when a phase command could not be spawned.
pub const EXIT_SPAWN_FAILED: i32 = 127;
/// Exit code reported when a phase was interrupted.
pub const EXIT_CANCELLED: i32 = 130;
/// Exit code reported when a phase command implementation panicked.
pub const EXIT_PANICKED: i32 = 101;

/// The recorded result of one phase invocation.
///
/// Outcomes are immutable once built; use the factory methods to create
/// them with a consistent status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// The phase this outcome belongs to.
    pub phase: Phase,

    /// Terminal status of the phase.
    pub status: PhaseStatus,

    /// Process exit code, when the process exited normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Terminating signal, when the process was killed by one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    /// Captured standard output (tail only when truncated).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,

    /// Captured standard error (tail only when truncated).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,

    /// When the phase started.
    pub started_at: DateTime<Utc>,

    /// When the phase ended.
    pub ended_at: DateTime<Utc>,

    /// Error description for failed, cancelled or timed out phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseOutcome {
    fn base(phase: Phase, status: PhaseStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            status,
            exit_code: None,
            signal: None,
            stdout: String::new(),
            stderr: String::new(),
            started_at,
            ended_at: Utc::now(),
            error: None,
        }
    }

    /// Creates an outcome for a process that exited with status zero.
    #[must_use]
    pub fn succeeded(phase: Phase, started_at: DateTime<Utc>) -> Self {
        let mut outcome = Self::base(phase, PhaseStatus::Succeeded, started_at);
        outcome.exit_code = Some(0);
        outcome
    }

    /// Creates an outcome for a process that exited with a non-zero code.
    #[must_use]
    pub fn failed(phase: Phase, started_at: DateTime<Utc>, exit_code: i32) -> Self {
        let mut outcome = Self::base(phase, PhaseStatus::Failed, started_at);
        outcome.exit_code = Some(exit_code);
        outcome.error = Some(format!("{phase} exited with code {exit_code}"));
        outcome
    }

    /// Creates an outcome for a process terminated by a signal.
    #[must_use]
    pub fn killed_by_signal(phase: Phase, started_at: DateTime<Utc>, signal: i32) -> Self {
        let mut outcome = Self::base(phase, PhaseStatus::Failed, started_at);
        outcome.signal = Some(signal);
        outcome.error = Some(format!("{phase} terminated by signal {signal}"));
        outcome
    }

    /// Creates a failed outcome that carries only an error message.
    #[must_use]
    pub fn errored(
        phase: Phase,
        started_at: DateTime<Utc>,
        exit_code: i32,
        error: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::base(phase, PhaseStatus::Failed, started_at);
        outcome.exit_code = Some(exit_code);
        outcome.error = Some(error.into());
        outcome
    }

    /// Creates an outcome for a phase that never ran.
    #[must_use]
    pub fn skipped(phase: Phase, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut outcome = Self::base(phase, PhaseStatus::Skipped, now);
        outcome.ended_at = now;
        outcome.error = Some(reason.into());
        outcome
    }

    /// Creates an outcome for a phase interrupted by cancellation.
    #[must_use]
    pub fn cancelled(phase: Phase, started_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        let mut outcome = Self::base(phase, PhaseStatus::Cancelled, started_at);
        outcome.error = Some(reason.into());
        outcome
    }

    /// Creates an outcome for a phase killed after exceeding its time limit.
    #[must_use]
    pub fn timed_out(phase: Phase, started_at: DateTime<Utc>, seconds: f64) -> Self {
        let mut outcome = Self::base(phase, PhaseStatus::TimedOut, started_at);
        outcome.error = Some(format!("{phase} timed out after {seconds}s"));
        outcome
    }

    /// Attaches captured output, keeping at most `max_bytes` of each stream.
    #[must_use]
    pub fn with_output(mut self, stdout: &str, stderr: &str, max_bytes: usize) -> Self {
        self.stdout = keep_tail(stdout, max_bytes).to_string();
        self.stderr = keep_tail(stderr, max_bytes).to_string();
        self
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Returns true if the phase succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the phase failed, was cancelled or timed out.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns the exit code this outcome maps to at the process boundary.
    ///
    /// A failure never maps to zero.
    #[must_use]
    pub fn effective_exit_code(&self) -> i32 {
        match self.status {
            PhaseStatus::Succeeded | PhaseStatus::Skipped | PhaseStatus::Pending => 0,
            PhaseStatus::Running => 1,
            PhaseStatus::TimedOut => EXIT_TIMED_OUT,
            PhaseStatus::Cancelled => EXIT_CANCELLED,
            PhaseStatus::Failed => match (self.exit_code, self.signal) {
                (Some(code), _) if code != 0 => code,
                (_, Some(signal)) => 128 + signal,
                _ => 1,
            },
        }
    }
}

/// Returns the last `max_bytes` of `text`, cut on a char boundary.
pub(crate) fn keep_tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
