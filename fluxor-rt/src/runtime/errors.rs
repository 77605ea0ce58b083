//! Error types for deployment operations.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::executor::ExecutorError;
use crate::util::DeploymentId;
use crate::verticle::BoxError;

/// Errors surfaced by [`Vertx`](super::Vertx) deployment operations.
#[derive(Debug, Error)]
pub enum DeployError {
    /// No deployment with the given id
    #[error("deployment not found: {0}")]
    NotFound(DeploymentId),

    /// The verticle's `start` returned an error
    #[error("verticle '{name}' failed to start: {source}")]
    StartFailed {
        /// Verticle name
        name: String,
        /// The start error
        source: BoxError,
    },

    /// The verticle's `start` did not finish within the spawn timeout
    #[error("verticle '{name}' start timed out after {timeout:?}")]
    StartTimeout {
        /// Verticle name
        name: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// The verticle's `stop` returned an error
    #[error("verticle '{name}' failed to stop: {source}")]
    StopFailed {
        /// Verticle name
        name: String,
        /// The stop error
        source: BoxError,
    },

    /// The verticle's `stop` did not finish within the stop deadline
    #[error("verticle '{name}' stop timed out after {timeout:?}")]
    StopTimeout {
        /// Verticle name
        name: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// The runtime is closing or closed
    #[error("runtime is closed")]
    Closed,

    /// Shutting the executor down failed during close
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
