//! Bounded FIFO mailboxes with non-blocking send and cancellable receive.
//!
//! The mailbox is the runtime's core fail-fast primitive: `try_send` returns
//! [`SendError::Full`] immediately at capacity instead of queueing without
//! bound. There is deliberately no timed send; callers that need a deadline
//! acquire admission from the backpressure controller first.

mod bounded;
mod errors;
mod metrics;

pub use bounded::Mailbox;
pub use errors::{RecvError, SendError, TryRecvError};
pub use metrics::MailboxMetrics;
