//! Error types for executor operations.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Errors surfaced by [`WorkerPool`](super::WorkerPool) operations.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Task queue is at capacity (fail-fast path)
    #[error("task queue is full (capacity: {capacity})")]
    QueueFull {
        /// The configured queue capacity that was hit
        capacity: usize,
    },

    /// Pool has been shut down; no further submissions are accepted
    #[error("executor is closed")]
    Closed,

    /// Timed submission did not find queue space within the deadline
    #[error("task submission timed out after {timeout:?}")]
    SubmitTimeout {
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// Shutdown deadline elapsed with tasks still in flight
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// The deadline that elapsed
        timeout: Duration,
    },
}
