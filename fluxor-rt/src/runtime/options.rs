//! Runtime configuration with sensible defaults.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::config::{keys, ConfigMap};

/// Default worker pool size
pub const DEFAULT_WORKERS: usize = 4;

/// Default executor task queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default timeout for verticle start (5 seconds)
pub const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for verticle stop (5 seconds)
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for graceful runtime shutdown (30 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime-wide options.
///
/// # Examples
///
/// ```rust
/// use fluxor_rt::runtime::VertxOptions;
/// use std::time::Duration;
///
/// let options = VertxOptions::default()
///     .with_workers(8)
///     .with_queue_capacity(512)
///     .with_spawn_timeout(Duration::from_secs(10));
/// assert_eq!(options.workers, 8);
/// ```
#[derive(Debug, Clone)]
pub struct VertxOptions {
    /// Worker pool size
    pub workers: usize,

    /// Executor task queue capacity
    pub queue_capacity: usize,

    /// Deadline for verticle start
    pub spawn_timeout: Duration,

    /// Deadline for verticle stop
    pub stop_timeout: Duration,

    /// Deadline for graceful runtime shutdown
    pub shutdown_timeout: Duration,

    /// Configuration injected into every context
    pub config: ConfigMap,
}

impl Default for VertxOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            spawn_timeout: DEFAULT_SPAWN_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            config: ConfigMap::empty(),
        }
    }
}

impl VertxOptions {
    /// Derive options from a loaded configuration map, honoring the
    /// `workers` and `max_queue` keys; the map itself rides along for
    /// context injection.
    pub fn from_config(config: ConfigMap) -> Self {
        let mut options = Self::default();
        if let Some(workers) = config.get_u64(keys::WORKERS) {
            options.workers = workers.max(1) as usize;
        }
        if let Some(queue) = config.get_u64(keys::MAX_QUEUE) {
            options.queue_capacity = queue.max(1) as usize;
        }
        options.config = config;
        options
    }

    /// Set the worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the executor queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the verticle start deadline.
    pub fn with_spawn_timeout(mut self, timeout: Duration) -> Self {
        self.spawn_timeout = timeout;
        self
    }

    /// Set the verticle stop deadline.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Set the graceful shutdown deadline.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Attach the configuration map injected into contexts.
    pub fn with_config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }
}
