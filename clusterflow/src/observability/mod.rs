//! Logging setup for the runner binary and embedders.

mod logging;

pub use logging::{init_tracing, level_for_verbosity, LogFormat};
