//! The cluster lifecycle runner.
//!
//! Runs Setup, Test and Teardown in strict order. Teardown runs on every
//! exit path, and the reported result comes from Test (or from Setup when
//! Setup failed).

#[cfg(test)]
mod integration_tests;
mod lifecycle;
mod result;

pub use lifecycle::LifecycleRunner;
pub use result::{RunResult, Verdict};
