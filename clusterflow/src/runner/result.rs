//! Run results and verdicts.

use crate::core::{Phase, PhaseOutcome, PhaseStatus, EXIT_CANCELLED};
use crate::errors::LifecycleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// The final outcome of a lifecycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// The run has not been decided yet.
    Pending,
    /// Setup and Test succeeded.
    Passed,
    /// Setup failed; Test never ran.
    SetupFailed {
        /// Setup's effective exit code.
        exit_code: i32,
    },
    /// Test failed.
    TestFailed {
        /// Test's effective exit code.
        exit_code: i32,
    },
    /// The run was interrupted.
    Cancelled {
        /// The phase that was interrupted.
        phase: Phase,
        /// Exit code reported for the interruption.
        exit_code: i32,
    },
}

impl Verdict {
    /// Decides the verdict from the Setup and Test outcomes.
    ///
    /// Teardown is deliberately not an input.
    #[must_use]
    pub fn from_outcomes(setup: &PhaseOutcome, test: &PhaseOutcome) -> Self {
        match setup.status {
            PhaseStatus::Succeeded => {}
            PhaseStatus::Cancelled => {
                return Self::Cancelled {
                    phase: Phase::Setup,
                    exit_code: setup.effective_exit_code(),
                }
            }
            _ => {
                return Self::SetupFailed {
                    exit_code: nonzero(setup.effective_exit_code()),
                }
            }
        }

        match test.status {
            PhaseStatus::Succeeded => Self::Passed,
            PhaseStatus::Cancelled => Self::Cancelled {
                phase: Phase::Test,
                exit_code: test.effective_exit_code(),
            },
            _ => Self::TestFailed {
                exit_code: nonzero(test.effective_exit_code()),
            },
        }
    }

    /// Returns the process exit code for this verdict.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Pending => 1,
            Self::SetupFailed { exit_code }
            | Self::TestFailed { exit_code }
            | Self::Cancelled { exit_code, .. } => *exit_code,
        }
    }

    /// Returns true if the run passed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Passed => write!(f, "passed"),
            Self::SetupFailed { exit_code } => write!(f, "setup failed (exit {exit_code})"),
            Self::TestFailed { exit_code } => write!(f, "test failed (exit {exit_code})"),
            Self::Cancelled { phase, exit_code } => {
                write!(f, "cancelled during {phase} (exit {exit_code})")
            }
        }
    }
}

const fn nonzero(code: i32) -> i32 {
    if code == 0 {
        1
    } else {
        code
    }
}

/// The record of one lifecycle invocation.
///
/// Created when the run starts, given its verdict once, and finalized when
/// Teardown has completed.
#[derive(Debug, Serialize)]
pub struct RunResult {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    verdict: Verdict,
    exit_code: i32,
    phases: Vec<PhaseOutcome>,
    #[serde(serialize_with = "serialize_warnings")]
    warnings: Vec<LifecycleError>,
}

impl RunResult {
    /// Creates an undecided result for a new run.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            ended_at: None,
            verdict: Verdict::Pending,
            exit_code: Verdict::Pending.exit_code(),
            phases: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn record_phase(&mut self, outcome: PhaseOutcome) {
        self.phases.push(outcome);
    }

    pub(crate) fn add_warning(&mut self, warning: LifecycleError) {
        self.warnings.push(warning);
    }

    pub(crate) fn set_verdict(&mut self, verdict: Verdict) {
        debug_assert!(
            self.verdict == Verdict::Pending,
            "verdict is decided exactly once"
        );
        self.verdict = verdict;
        self.exit_code = verdict.exit_code();
    }

    pub(crate) fn finalize(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Returns the run identifier.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the run started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run finished, once finalized.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Returns the verdict.
    #[must_use]
    pub const fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Returns the process exit code for this run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns true if the run passed. Teardown warnings do not affect this.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.verdict.is_success()
    }

    /// Returns every recorded phase outcome in execution order.
    #[must_use]
    pub fn phases(&self) -> &[PhaseOutcome] {
        &self.phases
    }

    /// Returns the outcome recorded for `phase`.
    #[must_use]
    pub fn phase(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|o| o.phase == phase)
    }

    /// Returns how many times `phase` actually ran (skips excluded).
    #[must_use]
    pub fn invocations(&self, phase: Phase) -> usize {
        self.phases
            .iter()
            .filter(|o| o.phase == phase && o.status != PhaseStatus::Skipped)
            .count()
    }

    /// Returns the non-fatal warnings, such as a failed teardown.
    #[must_use]
    pub fn warnings(&self) -> &[LifecycleError] {
        &self.warnings
    }

    /// Returns the primary error of the run, if it did not pass.
    #[must_use]
    pub fn error(&self) -> Option<LifecycleError> {
        let message = |phase: Phase| {
            self.phase(phase)
                .and_then(|o| o.error.clone())
                .unwrap_or_else(|| format!("{phase} failed"))
        };

        match self.verdict {
            Verdict::Passed => None,
            Verdict::Pending => Some(LifecycleError::Cancelled {
                phase: Phase::Setup,
                reason: "run did not complete".to_string(),
            }),
            Verdict::SetupFailed { exit_code } => {
                Some(LifecycleError::setup_failed(exit_code, message(Phase::Setup)))
            }
            Verdict::TestFailed { exit_code } => {
                Some(LifecycleError::test_failed(exit_code, message(Phase::Test)))
            }
            Verdict::Cancelled { phase, exit_code } => Some(LifecycleError::Cancelled {
                phase,
                reason: if exit_code == EXIT_CANCELLED {
                    message(phase)
                } else {
                    format!("{} (exit {exit_code})", message(phase))
                },
            }),
        }
    }

    /// Serializes the result as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}: {}", self.run_id, self.verdict)?;
        match self.warnings.len() {
            0 => Ok(()),
            1 => write!(f, ", 1 warning"),
            n => write!(f, ", {n} warnings"),
        }
    }
}

fn serialize_warnings<S>(warnings: &[LifecycleError], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(warnings.iter().map(LifecycleError::to_dict))
}
