//! The lifecycle phase enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One discrete step of the cluster lifecycle.
///
/// Phases always run in the order given by [`Phase::ORDER`]. Teardown is the
/// only phase that runs on every exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Provision the compute cluster.
    Setup,
    /// Run the test suite against the cluster.
    Test,
    /// Release the cluster.
    Teardown,
}

impl Phase {
    /// All phases in execution order.
    pub const ORDER: [Self; 3] = [Self::Setup, Self::Test, Self::Teardown];

    /// Returns the lowercase phase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Test => "test",
            Self::Teardown => "teardown",
        }
    }

    /// Returns the conventional build-tool target for this phase.
    #[must_use]
    pub const fn make_target(&self) -> &'static str {
        match self {
            Self::Setup => "setup_cluster",
            Self::Test => "test",
            Self::Teardown => "teardown_cluster",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
