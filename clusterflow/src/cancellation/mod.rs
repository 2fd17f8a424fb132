//! Structured cancellation and guaranteed release.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation of a run
//! - A signal listener that turns SIGINT/SIGTERM into a cancellation
//! - `run_with_release`, which runs a release action on every exit path

mod guard;
mod signal;
mod token;

pub(crate) use guard::panic_message;
pub use guard::{run_with_release, Guarded, Released};
pub use signal::spawn_signal_listener;
pub use token::CancellationToken;
