//! Deployment records tracked by the runtime.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use crate::util::DeploymentId;
use crate::verticle::Verticle;

/// Lifecycle state of a deployed verticle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    /// `start` is running
    Deploying,
    /// `start` completed; the verticle is live
    Running,
    /// `stop` is running
    Stopping,
    /// `stop` completed; the record is about to be removed
    Stopped,
    /// `start` failed
    Failed,
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// A tracked deployment.
pub(crate) struct Deployment {
    pub(crate) id: DeploymentId,
    pub(crate) name: String,
    pub(crate) state: DeploymentState,
    pub(crate) deployed_at: DateTime<Utc>,
    /// Child of the runtime root token; cancelled on undeploy.
    pub(crate) token: CancellationToken,
    /// Present while the verticle is running; taken for the stop call.
    pub(crate) verticle: Option<Box<dyn Verticle>>,
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("deployed_at", &self.deployed_at)
            .finish_non_exhaustive()
    }
}
