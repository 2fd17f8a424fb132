//! Scripted phase commands for testing.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::command::{PhaseCommand, PhaseContext};
use crate::core::PhaseOutcome;
use crate::errors::{LifecycleError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Exit(i32),
    Panic(String),
    Unspawnable,
}

/// A phase command that plays back a script instead of spawning a process.
///
/// Every invocation is recorded before any configured delay, so a command
/// that is cancelled or timed out still counts as invoked.
#[derive(Debug)]
pub struct ScriptedCommand {
    name: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delay: Option<Duration>,
    calls: Mutex<Vec<PhaseContext>>,
}

impl ScriptedCommand {
    fn new(name: impl Into<String>, script: Vec<Step>, fallback: Step) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a command that always exits 0.
    #[must_use]
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::exiting(name, 0)
    }

    /// Creates a command that always exits with `code`.
    #[must_use]
    pub fn exiting(name: impl Into<String>, code: i32) -> Self {
        Self::new(name, Vec::new(), Step::Exit(code))
    }

    /// Creates a command that exits with each code in turn, repeating the
    /// last one once the sequence is used up.
    #[must_use]
    pub fn sequence(name: impl Into<String>, codes: impl IntoIterator<Item = i32>) -> Self {
        let script: Vec<Step> = codes.into_iter().map(Step::Exit).collect();
        let fallback = script.last().cloned().unwrap_or(Step::Exit(0));
        Self::new(name, script, fallback)
    }

    /// Creates a command whose invocation panics with `message`.
    #[must_use]
    pub fn panicking(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Step::Panic(message.into()))
    }

    /// Creates a command that fails as if its program did not exist.
    #[must_use]
    pub fn unspawnable(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Step::Unspawnable)
    }

    /// Sleeps for `delay` on every invocation before finishing.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of times the command was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the context of every invocation.
    #[must_use]
    pub fn calls(&self) -> Vec<PhaseContext> {
        self.calls.lock().clone()
    }

    /// Clears recorded invocations.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl PhaseCommand for ScriptedCommand {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn invoke(&self, ctx: &PhaseContext) -> Result<PhaseOutcome> {
        let started_at = Utc::now();
        self.calls.lock().push(ctx.clone());
        let step = self.next_step();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match step {
            Step::Exit(0) => Ok(PhaseOutcome::succeeded(ctx.phase, started_at)),
            Step::Exit(code) => Ok(PhaseOutcome::failed(ctx.phase, started_at, code)),
            Step::Panic(message) => panic!("{message}"),
            Step::Unspawnable => Err(LifecycleError::Spawn {
                phase: ctx.phase,
                command: self.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            }),
        }
    }
}
