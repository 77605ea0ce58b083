//! Atomic message accounting shared by mailbox holders.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Lock-free counters tracking mailbox traffic.
///
/// All operations use relaxed atomics; counts are monotonic and the values
/// read are snapshots, good enough for metrics endpoints and tests.
#[derive(Debug, Default)]
pub struct MailboxMetrics {
    sent: AtomicU64,
    received: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

impl MailboxMetrics {
    /// Create a zeroed metrics recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message accepted into the queue.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message handed to a receiver.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a send rejected because the mailbox was full or closed.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message discarded without delivery (e.g. publish overflow).
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages accepted so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages received so far.
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Sends rejected so far.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Messages dropped so far.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Accepted-minus-received, i.e. messages still in flight.
    pub fn in_flight(&self) -> u64 {
        self.sent_count().saturating_sub(self.received_count())
    }
}
