// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::errors::{RecvError, SendError, TryRecvError};
use super::metrics::MailboxMetrics;

/// Bounded multi-producer/multi-consumer FIFO mailbox.
///
/// Sends are strictly non-blocking: at capacity [`Mailbox::try_send`] returns
/// [`SendError::Full`] immediately, handing the message back to the caller.
/// Receives block until a message arrives, the mailbox closes, or the
/// caller's cancellation token fires.
///
/// The receive side is shareable (clone the mailbox) so that a worker pool
/// can drain a single queue; FIFO order is preserved across any number of
/// concurrent senders.
///
/// # Example
///
/// ```rust
/// use fluxor_rt::mailbox::Mailbox;
///
/// let mailbox = Mailbox::new(2);
/// mailbox.try_send(1).unwrap();
/// mailbox.try_send(2).unwrap();
/// assert!(mailbox.try_send(3).is_err()); // full, fail fast
/// assert_eq!(mailbox.try_recv().unwrap(), 1);
/// ```
pub struct Mailbox<T> {
    inner: Arc<MailboxInner<T>>,
}

struct MailboxInner<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    len: AtomicUsize,
    closed: AtomicBool,
    /// Parked receivers; one permit per enqueued message.
    recv_notify: Notify,
    /// Parked in-crate waiters for free capacity (executor timed submit).
    space_notify: Notify,
    metrics: MailboxMetrics,
}

// Manual Clone: sharing the same queue must not require `T: Clone`.
impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send> Mailbox<T> {
    /// Create a bounded mailbox. A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(MailboxInner {
                queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
                capacity: capacity.max(1),
                len: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                recv_notify: Notify::new(),
                space_notify: Notify::new(),
                metrics: MailboxMetrics::new(),
            }),
        }
    }

    /// Enqueue a message without blocking.
    ///
    /// # Errors
    ///
    /// [`SendError::Full`] when the queue is at capacity, [`SendError::Closed`]
    /// after [`close`](Self::close). Both variants return the message.
    pub fn try_send(&self, message: T) -> Result<(), SendError<T>> {
        {
            let mut queue = self.inner.queue.lock();
            if self.inner.closed.load(Ordering::Acquire) {
                drop(queue);
                self.inner.metrics.record_rejected();
                return Err(SendError::Closed { message });
            }
            if queue.len() >= self.inner.capacity {
                drop(queue);
                self.inner.metrics.record_rejected();
                return Err(SendError::Full {
                    capacity: self.inner.capacity,
                    message,
                });
            }
            queue.push_back(message);
            self.inner.len.store(queue.len(), Ordering::Release);
        }
        self.inner.metrics.record_sent();
        self.inner.recv_notify.notify_one();
        Ok(())
    }

    /// Dequeue a message without blocking.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] when no message is queued,
    /// [`TryRecvError::Closed`] once the mailbox is closed and drained.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let popped = {
            let mut queue = self.inner.queue.lock();
            let popped = queue.pop_front();
            if popped.is_some() {
                self.inner.len.store(queue.len(), Ordering::Release);
            }
            popped
        };
        match popped {
            Some(message) => {
                self.inner.metrics.record_received();
                self.inner.space_notify.notify_one();
                Ok(message)
            }
            None if self.inner.closed.load(Ordering::Acquire) => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Await the next message.
    ///
    /// Resolves with [`RecvError::Closed`] once the mailbox is closed **and**
    /// fully drained, or [`RecvError::Cancelled`] when `token` fires.
    pub async fn recv(&self, token: &CancellationToken) -> Result<T, RecvError> {
        loop {
            // Register interest before the check so a concurrent send or
            // close between check and park cannot be missed.
            let mut notified = pin!(self.inner.recv_notify.notified());
            notified.as_mut().enable();

            match self.try_recv() {
                Ok(message) => return Ok(message),
                Err(TryRecvError::Closed) => return Err(RecvError::Closed),
                Err(TryRecvError::Empty) => {}
            }

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = token.cancelled() => return Err(RecvError::Cancelled),
            }
        }
    }

    /// Enqueue, waiting for capacity.
    ///
    /// Not part of the public contract (the mailbox itself has no timed
    /// send); the executor builds `submit_with_timeout` on top of this.
    pub(crate) async fn send_wait(&self, message: T) -> Result<(), SendError<T>> {
        let mut message = message;
        loop {
            let mut space = pin!(self.inner.space_notify.notified());
            space.as_mut().enable();

            match self.try_send(message) {
                Ok(()) => return Ok(()),
                Err(SendError::Closed { message }) => return Err(SendError::Closed { message }),
                Err(SendError::Full { message: m, .. }) => message = m,
            }

            space.await;
        }
    }

    /// Close the mailbox. Idempotent; wakes every parked receiver. Queued
    /// messages remain receivable until drained.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.recv_notify.notify_waiters();
        self.inner.space_notify.notify_waiters();
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the current queue depth (may be stale by the time it is
    /// observed).
    pub fn len(&self) -> usize {
        self.inner.len.load(Ordering::Acquire)
    }

    /// True when the snapshot depth is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Traffic counters for this mailbox.
    pub fn metrics(&self) -> &MailboxMetrics {
        &self.inner.metrics
    }
}
