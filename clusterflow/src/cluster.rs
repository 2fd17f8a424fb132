//! The cluster resource handle.
//!
//! A [`ClusterHandle`] is created by the runner when Setup finishes and is
//! consumed by Teardown. Holding it by value is what ties the provisioned
//! cluster to exactly one release.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Token representing the (possibly partially) provisioned cluster.
#[derive(Debug)]
pub struct ClusterHandle {
    run_id: Uuid,
    project_dir: Option<PathBuf>,
    provisioned: bool,
    acquired_at: DateTime<Utc>,
    released: bool,
}

impl ClusterHandle {
    /// Creates a handle for a cluster whose Setup succeeded.
    #[must_use]
    pub fn provisioned(run_id: Uuid, project_dir: Option<PathBuf>) -> Self {
        Self::new(run_id, project_dir, true)
    }

    /// Creates a handle for a Setup that failed part way.
    ///
    /// Teardown still receives it so partially started engines are released.
    #[must_use]
    pub fn partial(run_id: Uuid, project_dir: Option<PathBuf>) -> Self {
        Self::new(run_id, project_dir, false)
    }

    fn new(run_id: Uuid, project_dir: Option<PathBuf>, provisioned: bool) -> Self {
        Self {
            run_id,
            project_dir,
            provisioned,
            acquired_at: Utc::now(),
            released: false,
        }
    }

    /// Returns the run this cluster belongs to.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the project directory the cluster was started from.
    #[must_use]
    pub fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    /// Returns true if Setup completed successfully.
    #[must_use]
    pub const fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    /// Returns when the handle was created.
    #[must_use]
    pub const fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Hands the cluster to Teardown and consumes the handle.
    ///
    /// Called once Teardown is about to start, whatever its result turns out
    /// to be. Returns how long the cluster was held before teardown.
    pub fn release(mut self) -> chrono::Duration {
        self.released = true;
        Utc::now() - self.acquired_at
    }
}

impl Drop for ClusterHandle {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                run_id = %self.run_id,
                provisioned = self.provisioned,
                "Cluster handle dropped without teardown"
            );
        }
    }
}
