//! Per-invocation context handed to phase commands.

use crate::core::Phase;
use std::path::PathBuf;
use uuid::Uuid;

/// Context for a single phase invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseContext {
    /// The phase being run.
    pub phase: Phase,
    /// Identifier of the lifecycle run.
    pub run_id: Uuid,
    /// Project directory the run was started for.
    pub project_dir: Option<PathBuf>,
    /// Whether Setup completed. Always false during Setup itself.
    pub cluster_provisioned: bool,
}

impl PhaseContext {
    /// Creates a new phase context.
    #[must_use]
    pub const fn new(phase: Phase, run_id: Uuid) -> Self {
        Self {
            phase,
            run_id,
            project_dir: None,
            cluster_provisioned: false,
        }
    }

    /// Sets the project directory.
    #[must_use]
    pub fn with_project_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.project_dir = dir;
        self
    }

    /// Sets whether the cluster is provisioned.
    #[must_use]
    pub const fn with_cluster_provisioned(mut self, provisioned: bool) -> Self {
        self.cluster_provisioned = provisioned;
        self
    }

    /// Environment variables exported to external phase processes.
    #[must_use]
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("CLUSTERFLOW_RUN_ID", self.run_id.to_string()),
            ("CLUSTERFLOW_PHASE", self.phase.to_string()),
            (
                "CLUSTERFLOW_CLUSTER_PROVISIONED",
                if self.cluster_provisioned { "1" } else { "0" }.to_string(),
            ),
        ];
        if let Some(ref dir) = self.project_dir {
            vars.push(("CLUSTERFLOW_PROJECT_DIR", dir.display().to_string()));
        }
        vars
    }
}
