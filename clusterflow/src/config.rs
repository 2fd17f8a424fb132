//! Runner configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables, then command-line flags (applied by the binary).

use crate::command::{MakeTarget, ShellCommand, DEFAULT_MAX_CAPTURED_BYTES};
use crate::core::Phase;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the config file looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "clusterflow.toml";

/// Environment variable naming the project directory.
pub const ENV_PROJECT_DIR: &str = "CLUSTERFLOW_PROJECT_DIR";
/// CI build root, used when no project directory is configured.
pub const ENV_BUILD_DIR: &str = "TRAVIS_BUILD_DIR";
/// Build tool program.
pub const ENV_MAKE: &str = "MAKE";
/// Setup command override.
pub const ENV_SETUP: &str = "CLUSTERFLOW_SETUP";
/// Test command override.
pub const ENV_TEST: &str = "CLUSTERFLOW_TEST";
/// Teardown command override.
pub const ENV_TEARDOWN: &str = "CLUSTERFLOW_TEARDOWN";
/// Setup timeout in seconds.
pub const ENV_SETUP_TIMEOUT: &str = "CLUSTERFLOW_SETUP_TIMEOUT";
/// Test timeout in seconds.
pub const ENV_TEST_TIMEOUT: &str = "CLUSTERFLOW_TEST_TIMEOUT";
/// Teardown timeout in seconds.
pub const ENV_TEARDOWN_TIMEOUT: &str = "CLUSTERFLOW_TEARDOWN_TIMEOUT";

/// Configuration for a lifecycle run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Project root holding the Makefile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<PathBuf>,
    /// Build tool used for the default phase targets.
    #[serde(default = "default_make_program")]
    pub make_program: String,
    /// Setup command line, replacing `make setup_cluster`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    /// Test command line, replacing `make test`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    /// Teardown command line, replacing `make teardown_cluster`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<String>,
    /// Time limit for Setup in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_timeout_secs: Option<f64>,
    /// Time limit for Test in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_timeout_secs: Option<f64>,
    /// Time limit for Teardown in seconds.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_secs: f64,
    /// Per-stream cap on captured phase output.
    #[serde(default = "default_max_captured_bytes")]
    pub max_captured_bytes: usize,
    /// Log child output at info level.
    #[serde(default)]
    pub echo_output: bool,
    /// Cancel the run on SIGINT/SIGTERM.
    #[serde(default = "default_handle_signals")]
    pub handle_signals: bool,
    /// Extra environment passed to every phase.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_make_program() -> String {
    "make".to_string()
}

fn default_teardown_timeout() -> f64 {
    300.0
}

fn default_max_captured_bytes() -> usize {
    DEFAULT_MAX_CAPTURED_BYTES
}

fn default_handle_signals() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            project_dir: None,
            make_program: default_make_program(),
            setup: None,
            test: None,
            teardown: None,
            setup_timeout_secs: None,
            test_timeout_secs: None,
            teardown_timeout_secs: default_teardown_timeout(),
            max_captured_bytes: default_max_captured_bytes(),
            echo_output: false,
            handle_signals: default_handle_signals(),
            env: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from TOML text.
    ///
    /// `path` is only used in error messages.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Loads a configuration file, or returns defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// `CLUSTERFLOW_PROJECT_DIR` always wins; `TRAVIS_BUILD_DIR` is only used
    /// when no project directory is configured.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup(ENV_PROJECT_DIR) {
            self.project_dir = Some(PathBuf::from(dir));
        } else if self.project_dir.is_none() {
            self.project_dir = lookup(ENV_BUILD_DIR).map(PathBuf::from);
        }
        if let Some(make) = lookup(ENV_MAKE) {
            self.make_program = make;
        }
        if let Some(cmd) = lookup(ENV_SETUP) {
            self.setup = Some(cmd);
        }
        if let Some(cmd) = lookup(ENV_TEST) {
            self.test = Some(cmd);
        }
        if let Some(cmd) = lookup(ENV_TEARDOWN) {
            self.teardown = Some(cmd);
        }
        if let Some(secs) = lookup(ENV_SETUP_TIMEOUT) {
            self.setup_timeout_secs = Some(parse_seconds(ENV_SETUP_TIMEOUT, &secs)?);
        }
        if let Some(secs) = lookup(ENV_TEST_TIMEOUT) {
            self.test_timeout_secs = Some(parse_seconds(ENV_TEST_TIMEOUT, &secs)?);
        }
        if let Some(secs) = lookup(ENV_TEARDOWN_TIMEOUT) {
            self.teardown_timeout_secs = parse_seconds(ENV_TEARDOWN_TIMEOUT, &secs)?;
        }
        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.make_program.trim().is_empty() {
            return Err(ConfigError::invalid("make_program", "must not be empty"));
        }
        for (field, command) in [
            ("setup", &self.setup),
            ("test", &self.test),
            ("teardown", &self.teardown),
        ] {
            if command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(ConfigError::invalid(field, "command must not be empty"));
            }
        }
        for (field, secs) in [
            ("setup_timeout_secs", self.setup_timeout_secs),
            ("test_timeout_secs", self.test_timeout_secs),
            ("teardown_timeout_secs", Some(self.teardown_timeout_secs)),
        ] {
            if let Some(secs) = secs {
                check_seconds(field, secs)?;
            }
        }
        if self.max_captured_bytes == 0 {
            return Err(ConfigError::invalid("max_captured_bytes", "must be positive"));
        }
        Ok(())
    }

    /// Returns the project directory, falling back to the working directory.
    pub fn resolve_project_dir(&self) -> Result<PathBuf, ConfigError> {
        let dir = match self.project_dir {
            Some(ref dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| ConfigError::invalid("project_dir", e.to_string()))?,
        };
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ConfigError::MissingProjectDir(dir))
        }
    }

    /// Builds the command for one phase, rooted at `project_dir`.
    #[must_use]
    pub fn phase_command(&self, phase: Phase, project_dir: &Path) -> ShellCommand {
        let line = match phase {
            Phase::Setup => self.setup.as_deref(),
            Phase::Test => self.test.as_deref(),
            Phase::Teardown => self.teardown.as_deref(),
        };
        let command = match line {
            Some(line) => ShellCommand::shell(line).with_working_dir(project_dir),
            None => MakeTarget::for_phase(&self.make_program, project_dir, phase).into(),
        };
        command
            .with_envs(&self.env)
            .with_max_captured_bytes(self.max_captured_bytes)
            .with_echo_output(self.echo_output)
    }

    /// Validates the configuration and builds the three phase commands.
    pub fn phase_commands(&self) -> Result<[ShellCommand; 3], ConfigError> {
        self.validate()?;
        let dir = self.resolve_project_dir()?;
        Ok(Phase::ORDER.map(|phase| self.phase_command(phase, &dir)))
    }

    /// Setup time limit.
    ///
    /// Like the other limits, a value that does not fit a [`Duration`] means
    /// no limit; [`validate`](Self::validate) rejects such values up front.
    #[must_use]
    pub fn setup_timeout(&self) -> Option<Duration> {
        self.setup_timeout_secs.and_then(to_duration)
    }

    /// Test time limit.
    #[must_use]
    pub fn test_timeout(&self) -> Option<Duration> {
        self.test_timeout_secs.and_then(to_duration)
    }

    /// Teardown time limit.
    #[must_use]
    pub fn teardown_timeout(&self) -> Option<Duration> {
        to_duration(self.teardown_timeout_secs)
    }
}

fn to_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

fn check_seconds(field: &str, secs: f64) -> Result<f64, ConfigError> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(ConfigError::invalid(field, "must be a positive number of seconds"));
    }
    if to_duration(secs).is_none() {
        return Err(ConfigError::invalid(field, "is too large"));
    }
    Ok(secs)
}

fn parse_seconds(field: &str, raw: &str) -> Result<f64, ConfigError> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, format!("`{raw}` is not a number")))?;
    check_seconds(field, secs)
}
