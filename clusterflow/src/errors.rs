//! Error types for the clusterflow runner.
//!
//! The lifecycle taxonomy has three primary members (`SetupFailed`,
//! `TestFailed`, `TeardownFailed`). The remaining variants describe why a
//! phase could not produce an exit status of its own.

use crate::core::Phase;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Cluster provisioning failed; the test suite was not run.
    #[error("Setup failed with exit code {exit_code}: {message}")]
    SetupFailed {
        /// Effective exit code of the setup phase.
        exit_code: i32,
        /// Description of the failure.
        message: String,
    },

    /// The test suite failed.
    #[error("Test failed with exit code {exit_code}: {message}")]
    TestFailed {
        /// Effective exit code of the test phase.
        exit_code: i32,
        /// Description of the failure.
        message: String,
    },

    /// Releasing the cluster failed. Never fatal to the run.
    #[error("Teardown failed{}: {message}", fmt_exit_code(.exit_code))]
    TeardownFailed {
        /// Exit code, when the teardown process produced one.
        exit_code: Option<i32>,
        /// Description of the failure.
        message: String,
    },

    /// A phase command could not be spawned.
    #[error("Failed to spawn {phase} command `{command}`: {source}")]
    Spawn {
        /// The phase being started.
        phase: Phase,
        /// The command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A phase exceeded its time limit.
    #[error("{phase} timed out after {seconds}s")]
    Timeout {
        /// The phase that timed out.
        phase: Phase,
        /// The limit that was exceeded.
        seconds: f64,
    },

    /// A phase was interrupted by a cancellation request.
    #[error("{phase} cancelled: {reason}")]
    Cancelled {
        /// The phase that was interrupted.
        phase: Phase,
        /// Why the run was cancelled.
        reason: String,
    },

    /// Invalid or unreadable configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifecycleError {
    /// Creates a setup failure.
    #[must_use]
    pub fn setup_failed(exit_code: i32, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            exit_code,
            message: message.into(),
        }
    }

    /// Creates a test failure.
    #[must_use]
    pub fn test_failed(exit_code: i32, message: impl Into<String>) -> Self {
        Self::TestFailed {
            exit_code,
            message: message.into(),
        }
    }

    /// Creates a teardown failure.
    #[must_use]
    pub fn teardown_failed(exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self::TeardownFailed {
            exit_code,
            message: message.into(),
        }
    }

    /// Returns the short name used in reports and events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SetupFailed { .. } => "SetupFailed",
            Self::TestFailed { .. } => "TestFailed",
            Self::TeardownFailed { .. } => "TeardownFailed",
            Self::Spawn { .. } => "SpawnFailed",
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled { .. } => "Cancelled",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
        }
    }

    /// Returns the process exit code associated with this error, if any.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::SetupFailed { exit_code, .. } | Self::TestFailed { exit_code, .. } => {
                Some(*exit_code)
            }
            Self::TeardownFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Returns true if the error must not change the run's verdict.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::TeardownFailed { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!(self.kind()));
        map.insert("message".to_string(), json!(self.to_string()));

        match self {
            Self::Spawn { phase, command, .. } => {
                map.insert("phase".to_string(), json!(phase));
                map.insert("command".to_string(), json!(command));
            }
            Self::Timeout { phase, seconds } => {
                map.insert("phase".to_string(), json!(phase));
                map.insert("timeout_seconds".to_string(), json!(seconds));
            }
            Self::Cancelled { phase, reason } => {
                map.insert("phase".to_string(), json!(phase));
                map.insert("reason".to_string(), json!(reason));
            }
            _ => {}
        }

        if let Some(code) = self.exit_code() {
            map.insert("exit_code".to_string(), json!(code));
        }

        map
    }
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    code.map(|c| format!(" with exit code {c}")).unwrap_or_default()
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A field holds an unusable value.
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The project directory does not exist.
    #[error("Project directory does not exist: {0}")]
    MissingProjectDir(PathBuf),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T, E = LifecycleError> = std::result::Result<T, E>;
