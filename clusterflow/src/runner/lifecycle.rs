//! The lifecycle runner.

use super::{RunResult, Verdict};
use crate::cancellation::{
    panic_message, run_with_release, spawn_signal_listener, CancellationToken, Released,
};
use crate::cluster::ClusterHandle;
use crate::command::{PhaseCommand, PhaseContext};
use crate::config::RunnerConfig;
use crate::core::{Phase, PhaseOutcome, PhaseStatus, EXIT_PANICKED, EXIT_SPAWN_FAILED};
use crate::errors::{LifecycleError, Result};
use crate::events::{event_types, EventSink, LoggingEventSink};
use crate::utils::{generate_uuid, iso_timestamp};
use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Runs Setup, Test and Teardown around a compute cluster.
///
/// Each call to [`run`](Self::run) is independent: it gets a fresh run id,
/// a fresh cancellation token and a fresh [`RunResult`].
pub struct LifecycleRunner {
    config: RunnerConfig,
    sink: Arc<dyn EventSink>,
    cancellation: Option<Arc<CancellationToken>>,
}

impl LifecycleRunner {
    /// Creates a runner that logs events through `tracing`.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(LoggingEventSink::default()),
            cancellation: None,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Links an external cancellation token to every run.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the runner configuration.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Builds the three phase commands from the configuration and runs them.
    pub async fn run_configured(&self) -> Result<RunResult> {
        let [setup, test, teardown] = self.config.phase_commands()?;
        Ok(self.run(&setup, &test, &teardown).await)
    }

    /// Runs the lifecycle.
    ///
    /// Setup failure skips Test. Teardown runs in every case, and its failure
    /// is recorded as a warning without changing the verdict.
    pub async fn run(
        &self,
        setup: &dyn PhaseCommand,
        test: &dyn PhaseCommand,
        teardown: &dyn PhaseCommand,
    ) -> RunResult {
        let run_id = generate_uuid();
        let project_dir = self.config.project_dir.clone();
        let mut result = RunResult::new(run_id);

        let token = Arc::new(CancellationToken::new());
        token.on_cancel(move || {
            warn!(run_id = %run_id, "Cancellation requested; stopping the current phase");
        });
        let listeners = self.spawn_cancellation_listeners(&token);

        info!(
            run_id = %run_id,
            setup = %setup.describe(),
            test = %test.describe(),
            teardown = %teardown.describe(),
            "Starting cluster lifecycle"
        );
        self.sink
            .emit(
                event_types::LIFECYCLE_STARTED,
                Some(json!({
                    "run_id": run_id,
                    "timestamp": iso_timestamp(),
                    "project_dir": project_dir,
                })),
            )
            .await;

        let setup_ctx = PhaseContext::new(Phase::Setup, run_id).with_project_dir(project_dir.clone());
        let setup_outcome = self
            .execute_phase(setup, &setup_ctx, Some(&token), self.config.setup_timeout())
            .await;

        let handle = if setup_outcome.is_success() {
            ClusterHandle::provisioned(run_id, project_dir.clone())
        } else {
            warn!(
                run_id = %run_id,
                exit_code = setup_outcome.effective_exit_code(),
                "Setup did not complete; skipping tests and releasing partial cluster"
            );
            ClusterHandle::partial(run_id, project_dir.clone())
        };

        let test_ctx = PhaseContext {
            phase: Phase::Test,
            cluster_provisioned: handle.is_provisioned(),
            ..setup_ctx.clone()
        };
        let teardown_ctx = PhaseContext {
            phase: Phase::Teardown,
            cluster_provisioned: handle.is_provisioned(),
            ..setup_ctx
        };

        let setup_succeeded = setup_outcome.is_success();
        let test_started_at = Utc::now();
        let teardown_limit = self.config.teardown_timeout();

        let guarded = run_with_release(
            async {
                if !setup_succeeded {
                    let reason = if setup_outcome.status == PhaseStatus::Cancelled {
                        "run cancelled during setup"
                    } else {
                        "setup failed"
                    };
                    return self.skip_phase(Phase::Test, reason).await;
                }
                if token.is_cancelled() {
                    let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
                    warn!(run_id = %run_id, reason = %reason, "Run cancelled before tests started");
                    return PhaseOutcome::cancelled(Phase::Test, Utc::now(), reason);
                }
                self.execute_phase(test, &test_ctx, Some(&token), self.config.test_timeout())
                    .await
            },
            move || self.release(handle, teardown, teardown_ctx),
            teardown_limit,
        )
        .await;

        for listener in listeners {
            listener.abort();
        }

        let test_outcome = guarded.operation.unwrap_or_else(|message| {
            error!(run_id = %run_id, "Test phase panicked: {}", message);
            PhaseOutcome::errored(
                Phase::Test,
                test_started_at,
                EXIT_PANICKED,
                format!("test phase panicked: {message}"),
            )
        });

        let teardown_outcome = match guarded.release {
            Released::Completed(outcome) => outcome,
            Released::TimedOut(limit) => self.teardown_timed_out(limit).await,
        };

        result.set_verdict(Verdict::from_outcomes(&setup_outcome, &test_outcome));
        result.record_phase(setup_outcome);
        result.record_phase(test_outcome);

        if !teardown_outcome.is_success() {
            let warning = LifecycleError::teardown_failed(
                teardown_outcome.exit_code.filter(|code| *code != 0),
                teardown_outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "teardown did not succeed".to_string()),
            );
            warn!(run_id = %run_id, error = %warning, "Teardown failed; verdict unchanged");
            self.sink
                .emit(event_types::TEARDOWN_WARNING, Some(json!(warning.to_dict())))
                .await;
            result.add_warning(warning);
        }
        result.record_phase(teardown_outcome);
        result.finalize();

        if result.is_success() {
            info!(run_id = %run_id, warnings = result.warnings().len(), "Cluster lifecycle passed");
        } else {
            error!(
                run_id = %run_id,
                verdict = %result.verdict(),
                exit_code = result.exit_code(),
                "Cluster lifecycle failed"
            );
        }
        self.sink
            .emit(
                event_types::LIFECYCLE_COMPLETED,
                Some(json!({
                    "run_id": run_id,
                    "verdict": result.verdict(),
                    "exit_code": result.exit_code(),
                    "warnings": result.warnings().len(),
                })),
            )
            .await;

        result
    }

    /// Runs one phase command, mapping every way it can end to an outcome.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, phase = %ctx.phase))]
    async fn execute_phase(
        &self,
        command: &dyn PhaseCommand,
        ctx: &PhaseContext,
        token: Option<&CancellationToken>,
        timeout: Option<Duration>,
    ) -> PhaseOutcome {
        let phase = ctx.phase;
        let description = command.describe();
        let started_at = Utc::now();

        info!(command = %description, "Phase started");
        self.sink
            .emit(
                event_types::PHASE_STARTED,
                Some(json!({
                    "run_id": ctx.run_id,
                    "phase": phase,
                    "command": description,
                })),
            )
            .await;

        let invocation = async {
            let invoke = AssertUnwindSafe(command.invoke(ctx)).catch_unwind();
            match timeout {
                Some(limit) => tokio::time::timeout(limit, invoke).await.map_err(|_| limit),
                None => Ok(invoke.await),
            }
        };

        let outcome = tokio::select! {
            biased;
            () = wait_for_cancel(token) => {
                let reason = token
                    .and_then(CancellationToken::reason)
                    .unwrap_or_else(|| "cancelled".to_string());
                PhaseOutcome::cancelled(phase, started_at, reason)
            }
            finished = invocation => match finished {
                Ok(Ok(Ok(outcome))) => outcome,
                Ok(Ok(Err(err))) => {
                    let exit_code = match err {
                        LifecycleError::Spawn { .. } => EXIT_SPAWN_FAILED,
                        _ => 1,
                    };
                    PhaseOutcome::errored(phase, started_at, exit_code, err.to_string())
                }
                Ok(Err(payload)) => PhaseOutcome::errored(
                    phase,
                    started_at,
                    EXIT_PANICKED,
                    format!("{phase} command panicked: {}", panic_message(payload.as_ref())),
                ),
                Err(limit) => PhaseOutcome::timed_out(phase, started_at, limit.as_secs_f64()),
            },
        };

        self.phase_completed(&outcome, ctx).await;
        outcome
    }

    async fn skip_phase(&self, phase: Phase, reason: &str) -> PhaseOutcome {
        info!(phase = %phase, reason, "Phase skipped");
        self.sink
            .emit(
                event_types::PHASE_SKIPPED,
                Some(json!({ "phase": phase, "reason": reason })),
            )
            .await;
        PhaseOutcome::skipped(phase, reason)
    }

    /// Runs Teardown and consumes the cluster handle.
    ///
    /// Teardown ignores the run's cancellation token; only its own time limit
    /// can cut it short.
    async fn release(
        &self,
        handle: ClusterHandle,
        teardown: &dyn PhaseCommand,
        ctx: PhaseContext,
    ) -> PhaseOutcome {
        if !handle.is_provisioned() {
            debug!(run_id = %handle.run_id(), "Tearing down partially provisioned cluster");
        }
        // The handle belongs to Teardown from here on, even if the teardown
        // future is dropped by its time limit.
        let held = handle.release();
        debug!(held_ms = held.num_milliseconds(), "Cluster handed to teardown");
        self.execute_phase(teardown, &ctx, None, None).await
    }

    async fn teardown_timed_out(&self, limit: Duration) -> PhaseOutcome {
        let started_at = Utc::now()
            - chrono::Duration::from_std(limit).unwrap_or_else(|_| chrono::Duration::zero());
        let outcome = PhaseOutcome::timed_out(Phase::Teardown, started_at, limit.as_secs_f64());
        warn!(timeout_secs = limit.as_secs_f64(), "Teardown timed out and was killed");
        self.sink
            .emit(
                event_types::PHASE_COMPLETED,
                Some(json!({
                    "phase": Phase::Teardown,
                    "status": outcome.status,
                    "exit_code": outcome.effective_exit_code(),
                })),
            )
            .await;
        outcome
    }

    async fn phase_completed(&self, outcome: &PhaseOutcome, ctx: &PhaseContext) {
        if outcome.is_success() {
            info!(duration_ms = outcome.duration_ms(), "Phase succeeded");
        } else {
            warn!(
                status = %outcome.status,
                exit_code = outcome.effective_exit_code(),
                error = outcome.error.as_deref().unwrap_or(""),
                "Phase did not succeed"
            );
        }
        self.sink
            .emit(
                event_types::PHASE_COMPLETED,
                Some(json!({
                    "run_id": ctx.run_id,
                    "phase": outcome.phase,
                    "status": outcome.status,
                    "exit_code": outcome.effective_exit_code(),
                    "duration_ms": outcome.duration_ms(),
                })),
            )
            .await;
    }

    fn spawn_cancellation_listeners(&self, token: &Arc<CancellationToken>) -> Vec<JoinHandle<()>> {
        let mut listeners = Vec::new();

        if self.config.handle_signals {
            listeners.push(spawn_signal_listener(token.clone()));
        }

        if let Some(ref external) = self.cancellation {
            if external.is_cancelled() {
                token.cancel(external.reason().unwrap_or_else(|| "cancelled".to_string()));
            } else {
                let external = external.clone();
                let token = token.clone();
                listeners.push(tokio::spawn(async move {
                    external.cancelled().await;
                    token.cancel(external.reason().unwrap_or_else(|| "cancelled".to_string()));
                }));
            }
        }

        listeners
    }
}

impl std::fmt::Debug for LifecycleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRunner")
            .field("config", &self.config)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

async fn wait_for_cancel(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
