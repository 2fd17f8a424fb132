//! Phase commands.
//!
//! A phase is an invocable external process whose result contract is its
//! exit status. This module provides:
//! - The [`PhaseCommand`] trait the runner drives
//! - [`ShellCommand`] for real processes, with [`MakeTarget`] for build-tool targets
//! - [`FnCommand`] for in-process phases

mod context;
mod fn_command;
mod shell;

pub use context::PhaseContext;
pub use fn_command::FnCommand;
pub use shell::{MakeTarget, ShellCommand, DEFAULT_MAX_CAPTURED_BYTES};

use crate::core::PhaseOutcome;
use crate::errors::Result;
use async_trait::async_trait;

/// Trait for the commands behind each lifecycle phase.
///
/// An `Err` means the command could not produce an exit status at all
/// (for example the program was not found). A process that ran and exited
/// non-zero is an `Ok` outcome with a failed status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhaseCommand: Send + Sync {
    /// Returns a human readable description, usually the command line.
    fn describe(&self) -> String;

    /// Runs the command to completion.
    ///
    /// Dropping the returned future must stop the underlying process.
    async fn invoke(&self, ctx: &PhaseContext) -> Result<PhaseOutcome>;
}
