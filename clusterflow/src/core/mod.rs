//! Core domain model types for clusterflow.
//!
//! This module contains the fundamental types used throughout the runner:
//! - The lifecycle phase enum
//! - Phase status with terminal/success predicates
//! - Phase outcome records with factory methods

mod outcome;
mod phase;
mod status;

pub(crate) use outcome::keep_tail;
pub use outcome::{PhaseOutcome, EXIT_CANCELLED, EXIT_PANICKED, EXIT_SPAWN_FAILED, EXIT_TIMED_OUT};
pub use phase::Phase;
pub use status::PhaseStatus;
