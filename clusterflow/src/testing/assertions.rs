//! Test assertions for lifecycle runs.

use super::ScriptedCommand;
use crate::core::{Phase, PhaseStatus};
use crate::runner::RunResult;

/// Asserts that the command ran exactly once.
pub fn assert_invoked_once(command: &ScriptedCommand) {
    assert_eq!(
        command.call_count(),
        1,
        "Expected one invocation, got {}",
        command.call_count()
    );
}

/// Asserts that the command never ran.
pub fn assert_not_invoked(command: &ScriptedCommand) {
    assert_eq!(
        command.call_count(),
        0,
        "Expected no invocations, got {}",
        command.call_count()
    );
}

/// Asserts the run's exit code.
pub fn assert_exit_code(result: &RunResult, expected: i32) {
    assert_eq!(
        result.exit_code(),
        expected,
        "Expected exit code {}, got {} ({})",
        expected,
        result.exit_code(),
        result.verdict()
    );
}

/// Asserts the recorded status of a phase.
pub fn assert_phase_status(result: &RunResult, phase: Phase, expected: PhaseStatus) {
    let actual = result.phase(phase).map(|o| o.status);
    assert_eq!(
        actual,
        Some(expected),
        "Expected {} to be {:?}, got {:?}",
        phase,
        expected,
        actual
    );
}

/// Asserts that Teardown ran exactly once, whatever its outcome.
pub fn assert_teardown_ran(result: &RunResult) {
    assert_eq!(
        result.invocations(Phase::Teardown),
        1,
        "Expected teardown to run once, phases: {:?}",
        result
            .phases()
            .iter()
            .map(|o| (o.phase, o.status))
            .collect::<Vec<_>>()
    );
}
