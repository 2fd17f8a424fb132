//! End-to-end tests for the lifecycle runner.

use super::*;
use crate::cancellation::CancellationToken;
use crate::command::{MockPhaseCommand, PhaseContext};
use crate::config::RunnerConfig;
use crate::core::{
    Phase, PhaseOutcome, PhaseStatus, EXIT_CANCELLED, EXIT_PANICKED, EXIT_SPAWN_FAILED,
    EXIT_TIMED_OUT,
};
use crate::errors::LifecycleError;
use crate::events::{event_types, CollectingEventSink, NoOpEventSink};
use crate::testing::{
    assert_exit_code, assert_invoked_once, assert_not_invoked, assert_phase_status,
    assert_teardown_ran, ScriptedCommand,
};
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const HANG: Duration = Duration::from_secs(30);

fn config() -> RunnerConfig {
    RunnerConfig {
        handle_signals: false,
        ..RunnerConfig::default()
    }
}

fn runner_with(config: RunnerConfig) -> LifecycleRunner {
    LifecycleRunner::new(config).with_event_sink(Arc::new(NoOpEventSink))
}

fn runner() -> LifecycleRunner {
    runner_with(config())
}

#[tokio::test]
async fn test_all_phases_succeed() {
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner().run(&setup, &test, &teardown).await;

    assert!(result.is_success());
    assert_eq!(result.verdict(), Verdict::Passed);
    assert_exit_code(&result, 0);
    assert_invoked_once(&setup);
    assert_invoked_once(&test);
    assert_invoked_once(&teardown);
    assert_teardown_ran(&result);
    assert!(result.warnings().is_empty());
    assert!(result.ended_at().is_some());
    assert_eq!(
        result.phases().iter().map(|o| o.phase).collect::<Vec<_>>(),
        Phase::ORDER.to_vec()
    );
}

#[tokio::test]
async fn test_failing_tests_still_tear_down() {
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::exiting("test", 1);
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner().run(&setup, &test, &teardown).await;

    assert!(!result.is_success());
    assert_eq!(result.verdict(), Verdict::TestFailed { exit_code: 1 });
    assert_exit_code(&result, 1);
    assert_invoked_once(&teardown);
    assert!(matches!(
        result.error(),
        Some(LifecycleError::TestFailed { exit_code: 1, .. })
    ));
}

#[tokio::test]
async fn test_setup_failure_skips_tests() {
    let setup = ScriptedCommand::exiting("setup", 2);
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner().run(&setup, &test, &teardown).await;

    assert_eq!(result.verdict(), Verdict::SetupFailed { exit_code: 2 });
    assert_exit_code(&result, 2);
    assert_not_invoked(&test);
    assert_invoked_once(&teardown);
    assert_phase_status(&result, Phase::Test, PhaseStatus::Skipped);
    assert_eq!(result.invocations(Phase::Test), 0);

    let teardown_ctx = &teardown.calls()[0];
    assert!(!teardown_ctx.cluster_provisioned);
}

#[tokio::test]
async fn test_teardown_failure_is_only_a_warning() {
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::exiting("teardown", 1);

    let result = runner().run(&setup, &test, &teardown).await;

    assert!(result.is_success());
    assert_exit_code(&result, 0);
    assert_phase_status(&result, Phase::Teardown, PhaseStatus::Failed);
    assert_eq!(result.warnings().len(), 1);
    assert!(result.warnings()[0].is_warning());
    assert_eq!(result.warnings()[0].exit_code(), Some(1));
}

#[tokio::test]
async fn test_teardown_failure_does_not_mask_test_failure() {
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::exiting("test", 4);
    let teardown = ScriptedCommand::exiting("teardown", 9);

    let result = runner().run(&setup, &test, &teardown).await;

    assert_exit_code(&result, 4);
    assert_eq!(result.warnings().len(), 1);
}

#[tokio::test]
async fn test_runs_are_independent() {
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::sequence("test", [1, 0]);
    let teardown = ScriptedCommand::succeeding("teardown");
    let runner = runner();

    let first = runner.run(&setup, &test, &teardown).await;
    let second = runner.run(&setup, &test, &teardown).await;

    assert_exit_code(&first, 1);
    assert_exit_code(&second, 0);
    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(teardown.call_count(), 2);
    assert_eq!(first.invocations(Phase::Teardown), 1);
    assert_eq!(second.invocations(Phase::Teardown), 1);
}

#[tokio::test]
async fn test_phases_share_run_context() {
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner().run(&setup, &test, &teardown).await;

    let contexts = [&setup, &test, &teardown].map(|c| c.calls().remove(0));
    assert_eq!(
        contexts.iter().map(|c| c.phase).collect::<Vec<_>>(),
        Phase::ORDER.to_vec()
    );
    assert!(contexts.iter().all(|c| c.run_id == result.run_id()));
    assert!(contexts[1].cluster_provisioned);
    assert!(contexts[2].cluster_provisioned);
}

#[tokio::test]
async fn test_cancellation_during_tests_tears_down() {
    let token = Arc::new(CancellationToken::new());
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test").with_delay(HANG);
    let teardown = ScriptedCommand::succeeding("teardown");

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel("received SIGINT");
        })
    };

    let result = runner()
        .with_cancellation(token)
        .run(&setup, &test, &teardown)
        .await;
    canceller.await.unwrap();

    assert_eq!(
        result.verdict(),
        Verdict::Cancelled {
            phase: Phase::Test,
            exit_code: EXIT_CANCELLED
        }
    );
    assert_exit_code(&result, EXIT_CANCELLED);
    assert_invoked_once(&test);
    assert_invoked_once(&teardown);
    assert_eq!(
        result.phase(Phase::Test).and_then(|o| o.error.clone()),
        Some("received SIGINT".to_string())
    );
}

#[tokio::test]
async fn test_cancelled_before_start_skips_everything_but_teardown() {
    let token = Arc::new(CancellationToken::new());
    token.cancel("shutdown");
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner()
        .with_cancellation(token)
        .run(&setup, &test, &teardown)
        .await;

    assert_eq!(
        result.verdict(),
        Verdict::Cancelled {
            phase: Phase::Setup,
            exit_code: EXIT_CANCELLED
        }
    );
    assert_not_invoked(&setup);
    assert_not_invoked(&test);
    assert_invoked_once(&teardown);
}

#[tokio::test]
async fn test_test_timeout() {
    let config = RunnerConfig {
        test_timeout_secs: Some(0.05),
        ..config()
    };
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test").with_delay(HANG);
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner_with(config).run(&setup, &test, &teardown).await;

    assert_phase_status(&result, Phase::Test, PhaseStatus::TimedOut);
    assert_exit_code(&result, EXIT_TIMED_OUT);
    assert_invoked_once(&teardown);
}

#[tokio::test]
async fn test_teardown_timeout_is_a_warning() {
    let config = RunnerConfig {
        teardown_timeout_secs: 0.05,
        ..config()
    };
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown").with_delay(HANG);

    let result = runner_with(config).run(&setup, &test, &teardown).await;

    assert!(result.is_success());
    assert_phase_status(&result, Phase::Teardown, PhaseStatus::TimedOut);
    assert_invoked_once(&teardown);
    assert_eq!(result.warnings().len(), 1);
    assert_eq!(result.warnings()[0].exit_code(), None);
}

#[tokio::test]
async fn test_teardown_timeout_does_not_report_an_unreleased_cluster() {
    let logs = Arc::new(parking_lot::Mutex::new(Vec::<u8>::new()));
    let writer = {
        let logs = Arc::clone(&logs);
        move || SharedLog(Arc::clone(&logs))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(writer)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let config = RunnerConfig {
        teardown_timeout_secs: 0.05,
        ..config()
    };
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown").with_delay(HANG);

    let result = runner_with(config).run(&setup, &test, &teardown).await;

    assert_phase_status(&result, Phase::Teardown, PhaseStatus::TimedOut);
    let output = String::from_utf8_lossy(&logs.lock()).into_owned();
    assert!(output.contains("Teardown timed out"), "{output}");
    assert!(!output.contains("dropped without teardown"), "{output}");
}

struct SharedLog(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_test_still_tears_down() {
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::panicking("test", "fixture exploded");
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner().run(&setup, &test, &teardown).await;

    assert_exit_code(&result, EXIT_PANICKED);
    assert_invoked_once(&teardown);
    let error = result.phase(Phase::Test).and_then(|o| o.error.clone());
    assert!(error.is_some_and(|e| e.contains("fixture exploded")));
}

#[tokio::test]
async fn test_unspawnable_setup() {
    let setup = ScriptedCommand::unspawnable("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown");

    let result = runner().run(&setup, &test, &teardown).await;

    assert_eq!(
        result.verdict(),
        Verdict::SetupFailed {
            exit_code: EXIT_SPAWN_FAILED
        }
    );
    assert_not_invoked(&test);
    assert_invoked_once(&teardown);
}

#[tokio::test]
async fn test_event_sequence() {
    let sink = Arc::new(CollectingEventSink::new());
    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::exiting("teardown", 1);

    LifecycleRunner::new(config())
        .with_event_sink(sink.clone())
        .run(&setup, &test, &teardown)
        .await;

    assert_eq!(
        sink.event_types(),
        vec![
            event_types::LIFECYCLE_STARTED,
            event_types::PHASE_STARTED,
            event_types::PHASE_COMPLETED,
            event_types::PHASE_STARTED,
            event_types::PHASE_COMPLETED,
            event_types::PHASE_STARTED,
            event_types::PHASE_COMPLETED,
            event_types::TEARDOWN_WARNING,
            event_types::LIFECYCLE_COMPLETED,
        ]
    );
}

#[tokio::test]
async fn test_setup_failure_emits_skip_event() {
    let sink = Arc::new(CollectingEventSink::new());
    let setup = ScriptedCommand::exiting("setup", 2);
    let test = ScriptedCommand::succeeding("test");
    let teardown = ScriptedCommand::succeeding("teardown");

    LifecycleRunner::new(config())
        .with_event_sink(sink.clone())
        .run(&setup, &test, &teardown)
        .await;

    let skipped = sink.events_of_type(event_types::PHASE_SKIPPED);
    assert_eq!(skipped.len(), 1);
    let data = skipped[0].1.clone().unwrap();
    assert_eq!(data["phase"], "test");
    assert_eq!(data["reason"], "setup failed");
}

#[tokio::test]
async fn test_mock_commands() {
    let mut setup = MockPhaseCommand::new();
    setup.expect_describe().return_const("setup".to_string());
    setup
        .expect_invoke()
        .times(1)
        .returning(|ctx: &PhaseContext| Ok(PhaseOutcome::failed(ctx.phase, Utc::now(), 3)));

    let mut test = MockPhaseCommand::new();
    test.expect_describe().return_const("test".to_string());
    test.expect_invoke().times(0);

    let mut teardown = MockPhaseCommand::new();
    teardown.expect_describe().return_const("teardown".to_string());
    teardown
        .expect_invoke()
        .times(1)
        .returning(|ctx: &PhaseContext| Ok(PhaseOutcome::succeeded(ctx.phase, Utc::now())));

    let result = runner().run(&setup, &test, &teardown).await;

    assert_exit_code(&result, 3);
}

#[cfg(unix)]
mod processes {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    fn shell_config(dir: &std::path::Path, setup: &str, test: &str) -> RunnerConfig {
        RunnerConfig {
            project_dir: Some(dir.to_path_buf()),
            setup: Some(setup.to_string()),
            test: Some(test.to_string()),
            teardown: Some("touch torn-down".to_string()),
            ..config()
        }
    }

    #[tokio::test]
    async fn test_shell_exit_code_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_config(dir.path(), "exit 0", "echo 3 tests failed; exit 3");

        let result = runner_with(config).run_configured().await.unwrap();

        assert_exit_code(&result, 3);
        assert!(dir.path().join("torn-down").exists());
        assert_eq!(
            result.phase(Phase::Test).map(|o| o.stdout.as_str()),
            Some("3 tests failed\n")
        );
    }

    #[tokio::test]
    async fn test_shell_setup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_config(dir.path(), "exit 2", "touch tests-ran");

        let result = runner_with(config).run_configured().await.unwrap();

        assert_exit_code(&result, 2);
        assert!(!dir.path().join("tests-ran").exists());
        assert!(dir.path().join("torn-down").exists());
    }

    #[tokio::test]
    async fn test_shell_timeout_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            test_timeout_secs: Some(0.2),
            ..shell_config(dir.path(), "true", "sleep 30")
        };

        let started = Instant::now();
        let result = runner_with(config).run_configured().await.unwrap();

        assert_exit_code(&result, EXIT_TIMED_OUT);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(dir.path().join("torn-down").exists());
    }

    #[tokio::test]
    async fn test_setup_that_backgrounds_a_daemon_finishes_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_config(dir.path(), "sleep 30 & exit 0", "exit 0");

        let started = Instant::now();
        let result = runner_with(config).run_configured().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(result.is_success());
        assert_phase_status(&result, Phase::Setup, PhaseStatus::Succeeded);
        assert!(dir.path().join("torn-down").exists());
    }

    #[tokio::test]
    async fn test_missing_project_dir_is_config_error() {
        let config = RunnerConfig {
            project_dir: Some("/nonexistent/clusterflow-project".into()),
            ..config()
        };

        let err = runner_with(config).run_configured().await.unwrap_err();

        assert_eq!(err.kind(), "ConfigError");
    }
}
