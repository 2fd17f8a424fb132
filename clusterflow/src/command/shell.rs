//! External process commands.

use super::{PhaseCommand, PhaseContext};
use crate::core::{keep_tail, Phase, PhaseOutcome};
use crate::errors::{LifecycleError, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default cap on captured output per stream (64 KiB).
pub const DEFAULT_MAX_CAPTURED_BYTES: usize = 64 * 1024;

/// How long output readers may run on after the process has exited.
const OUTPUT_GRACE: Duration = Duration::from_millis(250);

/// A phase backed by an external process.
///
/// The child is spawned with `kill_on_drop`, so cancelling the invocation
/// future terminates the process.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    display: String,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    max_captured_bytes: usize,
    echo_output: bool,
}

impl ShellCommand {
    /// Creates a command that runs `program` with `args` directly.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let display = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            program,
            args,
            display,
            working_dir: None,
            env: BTreeMap::new(),
            max_captured_bytes: DEFAULT_MAX_CAPTURED_BYTES,
            echo_output: false,
        }
    }

    /// Creates a command that runs `line` through the platform shell.
    pub fn shell(line: impl Into<String>) -> Self {
        let line = line.into();
        let mut command = if cfg!(target_os = "windows") {
            Self::new("cmd", ["/C".to_string(), line.clone()])
        } else {
            Self::new("sh", ["-c".to_string(), line.clone()])
        };
        command.display = line;
        command
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds several environment variables.
    #[must_use]
    pub fn with_envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Sets the per-stream capture limit.
    #[must_use]
    pub const fn with_max_captured_bytes(mut self, max_bytes: usize) -> Self {
        self.max_captured_bytes = max_bytes;
        self
    }

    /// Logs child output at info level instead of debug.
    #[must_use]
    pub const fn with_echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the program arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory, if set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

#[async_trait]
impl PhaseCommand for ShellCommand {
    fn describe(&self) -> String {
        self.display.clone()
    }

    async fn invoke(&self, ctx: &PhaseContext) -> Result<PhaseOutcome> {
        let started_at = Utc::now();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .envs(ctx.env_vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        debug!(phase = %ctx.phase, command = %self.display, "Spawning phase command");
        let mut child = command.spawn().map_err(|source| LifecycleError::Spawn {
            phase: ctx.phase,
            command: self.display.clone(),
            source,
        })?;

        let stdout = CaptureTask::spawn(
            child.stdout.take(),
            ctx.phase,
            "stdout",
            self.max_captured_bytes,
            self.echo_output,
        );
        let stderr = CaptureTask::spawn(
            child.stderr.take(),
            ctx.phase,
            "stderr",
            self.max_captured_bytes,
            self.echo_output,
        );

        // The phase ends when the process exits. Background children may keep
        // the pipes open for much longer.
        let status = child.wait().await?;
        let out = stdout.finish(OUTPUT_GRACE).await;
        let err = stderr.finish(OUTPUT_GRACE).await;

        let outcome = match status.code() {
            Some(0) => PhaseOutcome::succeeded(ctx.phase, started_at),
            Some(code) => PhaseOutcome::failed(ctx.phase, started_at, code),
            None => match exit_signal(&status) {
                Some(signal) => PhaseOutcome::killed_by_signal(ctx.phase, started_at, signal),
                None => PhaseOutcome::errored(
                    ctx.phase,
                    started_at,
                    1,
                    "process exited without a status code",
                ),
            },
        };

        Ok(outcome.with_output(&out, &err, self.max_captured_bytes))
    }
}

/// A build-tool target such as `make -C <project> setup_cluster`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeTarget {
    /// The build tool program, usually `make`.
    pub make_program: String,
    /// Directory holding the Makefile.
    pub project_dir: PathBuf,
    /// Target name.
    pub target: String,
}

impl MakeTarget {
    /// Creates a new target.
    #[must_use]
    pub fn new(
        make_program: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            make_program: make_program.into(),
            project_dir: project_dir.into(),
            target: target.into(),
        }
    }

    /// Creates the conventional target for a lifecycle phase.
    #[must_use]
    pub fn for_phase(
        make_program: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        phase: Phase,
    ) -> Self {
        Self::new(make_program, project_dir, phase.make_target())
    }
}

impl From<MakeTarget> for ShellCommand {
    fn from(target: MakeTarget) -> Self {
        let dir = target.project_dir.display().to_string();
        Self::new(target.make_program, [String::from("-C"), dir, target.target])
    }
}

/// Reads one output stream of a child on its own task.
///
/// Aborted on drop unless [`finish`](Self::finish) detached it.
struct CaptureTask {
    stream_name: &'static str,
    buffer: Arc<Mutex<String>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl CaptureTask {
    fn spawn<R>(
        stream: Option<R>,
        phase: Phase,
        stream_name: &'static str,
        max_bytes: usize,
        echo: bool,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(String::new()));
        let handle = stream.map(|stream| {
            tokio::spawn(capture(
                stream,
                phase,
                stream_name,
                max_bytes,
                echo,
                Arc::clone(&buffer),
            ))
        });
        Self {
            stream_name,
            buffer,
            handle,
        }
    }

    /// Waits up to `grace` for the stream to close, then returns what was
    /// captured.
    ///
    /// A stream still held open by a background process is left to drain on
    /// its own task, so the process never writes into a closed pipe.
    async fn finish(mut self, grace: Duration) -> String {
        if let Some(mut handle) = self.handle.take() {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!(stream = self.stream_name, "Failed to read phase output: {}", e);
                }
                Ok(Err(e)) => {
                    warn!(stream = self.stream_name, "Output reader stopped: {}", e);
                }
                Err(_) => {
                    debug!(
                        stream = self.stream_name,
                        "Stream still open after exit; a background process holds it"
                    );
                }
            }
        }
        self.buffer.lock().clone()
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        if let Some(ref handle) = self.handle {
            handle.abort();
        }
    }
}

async fn capture<R>(
    stream: R,
    phase: Phase,
    stream_name: &'static str,
    max_bytes: usize,
    echo: bool,
    buffer: Arc<Mutex<String>>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches(|c| c == '\n' || c == '\r');
        if echo {
            info!(phase = %phase, stream = stream_name, "{}", trimmed);
        } else {
            debug!(phase = %phase, stream = stream_name, "{}", trimmed);
        }

        let mut captured = buffer.lock();
        captured.push_str(&text);
        if captured.len() > max_bytes.saturating_mul(2) {
            let tail = keep_tail(&captured, max_bytes).to_string();
            *captured = tail;
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
