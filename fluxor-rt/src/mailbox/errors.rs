//! Error types for mailbox operations.

// Layer 1: Standard library imports
use std::error::Error;
use std::fmt;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Error returned by [`Mailbox::try_send`](super::Mailbox::try_send).
///
/// Carries the rejected message back to the caller so it can be retried,
/// redirected, or dropped deliberately.
pub enum SendError<T> {
    /// Mailbox is at capacity (bounded fail-fast path)
    Full {
        /// The configured capacity that was hit
        capacity: usize,
        /// The message that was not enqueued
        message: T,
    },

    /// Mailbox has been closed
    Closed {
        /// The message that was not enqueued
        message: T,
    },
}

impl<T> SendError<T> {
    /// Recover the message that failed to send.
    pub fn into_message(self) -> T {
        match self {
            Self::Full { message, .. } | Self::Closed { message } => message,
        }
    }

    /// True when the send failed because the mailbox was full.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    /// True when the send failed because the mailbox was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

// Manual Display/Debug/Error impls keep `T` free of trait bounds.
impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { capacity, .. } => f
                .debug_struct("SendError::Full")
                .field("capacity", capacity)
                .finish_non_exhaustive(),
            Self::Closed { .. } => f.debug_struct("SendError::Closed").finish_non_exhaustive(),
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { capacity, .. } => {
                write!(f, "mailbox is full (capacity: {capacity})")
            }
            Self::Closed { .. } => write!(f, "mailbox is closed"),
        }
    }
}

impl<T> Error for SendError<T> {}

/// Error returned by [`Mailbox::recv`](super::Mailbox::recv).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    /// Mailbox is closed and fully drained
    #[error("mailbox is closed")]
    Closed,

    /// The caller's cancellation token fired while waiting
    #[error("receive cancelled")]
    Cancelled,
}

/// Error returned by [`Mailbox::try_recv`](super::Mailbox::try_recv).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    /// Mailbox is empty (no messages available)
    #[error("mailbox is empty")]
    Empty,

    /// Mailbox is closed and fully drained
    #[error("mailbox is closed")]
    Closed,
}
