//! Event sinks for lifecycle observability.
//!
//! The runner reports every phase transition through an [`EventSink`] in
//! addition to its own log lines, so callers can collect a machine-readable
//! trail of a run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the runner.
pub mod event_types {
    /// A lifecycle run started.
    pub const LIFECYCLE_STARTED: &str = "lifecycle.started";
    /// A phase command is about to run.
    pub const PHASE_STARTED: &str = "phase.started";
    /// A phase command finished (any terminal status).
    pub const PHASE_COMPLETED: &str = "phase.completed";
    /// A phase was not run.
    pub const PHASE_SKIPPED: &str = "phase.skipped";
    /// Teardown failed; the run verdict is unaffected.
    pub const TEARDOWN_WARNING: &str = "teardown.warning";
    /// A lifecycle run finished.
    pub const LIFECYCLE_COMPLETED: &str = "lifecycle.completed";
}
