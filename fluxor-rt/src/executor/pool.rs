// Layer 1: Standard library imports
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::errors::ExecutorError;
use crate::mailbox::{Mailbox, SendError};

/// Unit of work executed by the pool.
pub type Task = BoxFuture<'static, ()>;

/// Fixed pool of workers draining a bounded task queue.
///
/// Submission is the runtime's fail-fast seam: [`WorkerPool::submit`] returns
/// [`ExecutorError::QueueFull`] immediately when the queue is saturated, so
/// overload surfaces at the boundary instead of building an unbounded
/// backlog. Each worker wraps tasks in panic recovery; a panicking task never
/// takes its worker down.
///
/// # Example
///
/// ```rust,ignore
/// use fluxor_rt::executor::WorkerPool;
///
/// let pool = WorkerPool::new(4, 64);
/// pool.submit(Box::pin(async {
///     // handler work
/// }))?;
/// pool.shutdown(std::time::Duration::from_secs(5)).await?;
/// ```
pub struct WorkerPool {
    queue: Mailbox<Task>,
    workers: usize,
    counters: Arc<PoolCounters>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    worker_token: CancellationToken,
}

#[derive(Debug, Default)]
struct PoolCounters {
    active: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

/// Point-in-time view of pool load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorStats {
    /// Tasks waiting in the queue
    pub queued: usize,
    /// Tasks currently running on workers
    pub active: u64,
    /// Tasks that ran to completion
    pub completed: u64,
    /// Submissions rejected because the queue was full
    pub rejected: u64,
    /// Tasks that panicked (recovered)
    pub panicked: u64,
    /// Queue capacity
    pub capacity: usize,
    /// Number of workers
    pub workers: usize,
    /// Queue depth as a percentage of capacity
    pub utilization_pct: f64,
}

impl WorkerPool {
    /// Spawn a pool of `workers` workers over a queue of `queue_capacity`.
    ///
    /// Zero values are clamped to one.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let queue: Mailbox<Task> = Mailbox::new(queue_capacity.max(1));
        let counters = Arc::new(PoolCounters::default());
        let worker_token = CancellationToken::new();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let counters = Arc::clone(&counters);
            let token = worker_token.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, counters, token).await;
            }));
        }

        Self {
            queue,
            workers,
            counters,
            handles: Mutex::new(handles),
            worker_token,
        }
    }

    /// Submit a task without blocking.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::QueueFull`] when the queue is saturated (the task is
    /// dropped), [`ExecutorError::Closed`] after shutdown.
    pub fn submit(&self, task: Task) -> Result<(), ExecutorError> {
        match self.queue.try_send(task) {
            Ok(()) => Ok(()),
            Err(SendError::Full { capacity, .. }) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ExecutorError::QueueFull { capacity })
            }
            Err(SendError::Closed { .. }) => Err(ExecutorError::Closed),
        }
    }

    /// Submit a task, waiting up to `timeout` for queue space.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::SubmitTimeout`] when no space frees up in time,
    /// [`ExecutorError::Closed`] after shutdown.
    pub async fn submit_with_timeout(
        &self,
        task: Task,
        timeout: Duration,
    ) -> Result<(), ExecutorError> {
        match tokio::time::timeout(timeout, self.queue.send_wait(task)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_closed)) => Err(ExecutorError::Closed),
            Err(_elapsed) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ExecutorError::SubmitTimeout { timeout })
            }
        }
    }

    /// Close the queue and wait for workers to drain in-flight tasks.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::ShutdownTimeout`] if workers are still busy when the
    /// deadline fires; the queue stays closed either way.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ExecutorError> {
        self.queue.close();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock();
            guard.drain(..).collect()
        };

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => Ok(()),
            Err(_elapsed) => {
                // Workers still running; tell them to stop between tasks.
                self.worker_token.cancel();
                Err(ExecutorError::ShutdownTimeout { timeout })
            }
        }
    }

    /// Current pool load.
    pub fn stats(&self) -> ExecutorStats {
        let queued = self.queue.len();
        let capacity = self.queue.capacity();
        ExecutorStats {
            queued,
            active: self.counters.active.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            capacity,
            workers: self.workers,
            utilization_pct: (queued as f64 / capacity as f64) * 100.0,
        }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// True once the pool has been shut down.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Mailbox<Task>,
    counters: Arc<PoolCounters>,
    token: CancellationToken,
) {
    loop {
        let task = match queue.recv(&token).await {
            Ok(task) => task,
            Err(_) => break,
        };

        counters.active.fetch_add(1, Ordering::Relaxed);
        let outcome = AssertUnwindSafe(task).catch_unwind().await;
        counters.active.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_panic) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id, "task panicked; worker continues");
            }
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to use unwrap/panic
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_submit_and_run() {
        let pool = WorkerPool::new(2, 8);
        let (tx, rx) = oneshot::channel();

        pool.submit(Box::pin(async move {
            let _ = tx.send(41 + 1);
        }))
        .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_submit_fails_fast_when_saturated() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        // Occupy the single worker.
        pool.submit(Box::pin(async move {
            let _ = release_rx.await;
        }))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fill the queue.
        pool.submit(Box::pin(async {})).unwrap();

        // Everything beyond worker + queue is rejected in O(1).
        for _ in 0..5 {
            let result = pool.submit(Box::pin(async {}));
            assert!(matches!(result, Err(ExecutorError::QueueFull { .. })));
        }
        assert_eq!(pool.stats().rejected, 5);

        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_submit_with_timeout_expires() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        pool.submit(Box::pin(async move {
            let _ = release_rx.await;
        }))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.submit(Box::pin(async {})).unwrap();

        let result = pool
            .submit_with_timeout(Box::pin(async {}), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ExecutorError::SubmitTimeout { .. })));

        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_submit_with_timeout_succeeds_when_space_frees() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        pool.submit(Box::pin(async move {
            let _ = release_rx.await;
        }))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.submit(Box::pin(async {})).unwrap();

        // Free the worker shortly; the queued task drains and the timed
        // submission slots in.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = release_tx.send(());
        });

        pool.submit_with_timeout(Box::pin(async {}), Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_panic_does_not_kill_worker() {
        let pool = WorkerPool::new(1, 8);

        pool.submit(Box::pin(async {
            panic!("boom");
        }))
        .unwrap();

        // The same (single) worker must still execute the next task.
        let (tx, rx) = oneshot::channel();
        pool.submit(Box::pin(async move {
            let _ = tx.send(());
        }))
        .unwrap();

        rx.await.unwrap();
        assert_eq!(pool.stats().panicked, 1);
        assert!(pool.stats().completed >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let pool = WorkerPool::new(2, 16);
        let counter = Arc::new(AtomicU64::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::pin(async move {
                counter.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        }

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 10);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let pool = WorkerPool::new(1, 4);
        pool.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = pool.submit(Box::pin(async {}));
        assert!(matches!(result, Err(ExecutorError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_timeout_on_stuck_task() {
        let pool = WorkerPool::new(1, 4);
        let (_hold_tx, hold_rx) = oneshot::channel::<()>();

        pool.submit(Box::pin(async move {
            let _ = hold_rx.await; // never released
        }))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = pool.shutdown(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ExecutorError::ShutdownTimeout { .. })));
    }

    #[tokio::test]
    async fn test_stats_shape() {
        let pool = WorkerPool::new(3, 10);
        let stats = pool.stats();
        assert_eq!(stats.workers, 3);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.utilization_pct, 0.0);
    }
}
