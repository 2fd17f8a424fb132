//! # Clusterflow
//!
//! Runs a test suite against a compute cluster that exists only for the
//! duration of the run.
//!
//! A run has three phases:
//!
//! - **Setup** provisions the cluster (for example `make setup_cluster`)
//! - **Test** runs the suite against it, and only if Setup succeeded
//! - **Teardown** releases the cluster, always, exactly once per run
//!
//! The run's exit code is Test's exit code, or Setup's if Setup failed.
//! A failing Teardown is reported as a warning and never changes it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clusterflow::prelude::*;
//!
//! # async fn demo() -> clusterflow::errors::Result<()> {
//! let config = RunnerConfig {
//!     project_dir: Some("/src/distarray".into()),
//!     ..RunnerConfig::default()
//! };
//! let result = LifecycleRunner::new(config).run_configured().await?;
//! std::process::exit(result.exit_code());
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod cluster;
pub mod command;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod runner;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::cluster::ClusterHandle;
    pub use crate::command::{FnCommand, MakeTarget, PhaseCommand, PhaseContext, ShellCommand};
    pub use crate::config::RunnerConfig;
    pub use crate::core::{Phase, PhaseOutcome, PhaseStatus};
    pub use crate::errors::{ConfigError, LifecycleError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::runner::{LifecycleRunner, RunResult, Verdict};
    pub use crate::utils::{generate_uuid, iso_timestamp};
}
