//! Testing utilities for lifecycle runs.
//!
//! This module provides:
//! - Scripted phase commands that record their invocations
//! - Assertions over [`RunResult`](crate::runner::RunResult)

mod assertions;
mod mocks;

pub use assertions::{
    assert_exit_code, assert_invoked_once, assert_not_invoked, assert_phase_status,
    assert_teardown_ran,
};
pub use mocks::ScriptedCommand;
