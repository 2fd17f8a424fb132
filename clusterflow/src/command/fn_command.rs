//! Closure-backed phase commands.

use super::{PhaseCommand, PhaseContext};
use crate::core::PhaseOutcome;
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// A phase implemented by a synchronous closure.
///
/// Useful when a phase is a check inside the current process rather than
/// an external program.
pub struct FnCommand<F>
where
    F: Fn(&PhaseContext) -> Result<PhaseOutcome> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnCommand<F>
where
    F: Fn(&PhaseContext) -> Result<PhaseOutcome> + Send + Sync,
{
    /// Creates a new closure-backed command.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnCommand<F>
where
    F: Fn(&PhaseContext) -> Result<PhaseOutcome> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCommand")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> PhaseCommand for FnCommand<F>
where
    F: Fn(&PhaseContext) -> Result<PhaseOutcome> + Send + Sync,
{
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn invoke(&self, ctx: &PhaseContext) -> Result<PhaseOutcome> {
        (self.func)(ctx)
    }
}
