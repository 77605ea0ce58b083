//! Bus-level traffic counters.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Lock-free counters for bus traffic.
///
/// `dropped` counts publish copies discarded because a consumer mailbox was
/// full; per-consumer overflow detail lives on each subscription.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    sent: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BusMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish calls so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Point-to-point sends accepted so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Mailbox deliveries so far (publish copies + sends).
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Publish copies dropped on overflow so far.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = BusMetrics::new();
        metrics.record_published();
        metrics.record_sent();
        metrics.record_delivered();
        metrics.record_delivered();
        metrics.record_dropped();

        assert_eq!(metrics.published_count(), 1);
        assert_eq!(metrics.sent_count(), 1);
        assert_eq!(metrics.delivered_count(), 2);
        assert_eq!(metrics.dropped_count(), 1);
    }
}
