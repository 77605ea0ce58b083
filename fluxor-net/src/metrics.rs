//! Server-front counters shared by the TCP and HTTP servers.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use serde::Serialize;

// Layer 3: Internal module imports
// (none)

/// Lock-free connection accounting.
///
/// `accepted` counts every inbound connection; `rejected` the ones turned
/// away at admission; `queued`/`active` are gauges tracking connections
/// waiting for and occupying workers.
#[derive(Debug)]
pub struct ServerMetrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    handled: AtomicU64,
    errored: AtomicU64,
    queued: AtomicU64,
    active: AtomicU64,
    normal_ccu: u64,
}

/// Point-in-time view of a server front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ServerMetricsSnapshot {
    /// Connections accepted by the listener
    pub accepted: u64,
    /// Connections rejected at admission
    pub rejected: u64,
    /// Connections whose handler completed cleanly
    pub handled: u64,
    /// Connections whose handler returned an error
    pub errored: u64,
    /// Connections waiting for a worker
    pub queued: u64,
    /// Connections currently being handled
    pub active_conns: u64,
    /// Alias of `active_conns` for capacity dashboards
    pub current_ccu: u64,
    /// Admission baseline (workers + queue capacity)
    pub normal_ccu: u64,
    /// `current_ccu / normal_ccu`
    pub utilization: f64,
}

impl ServerMetrics {
    /// Create zeroed counters with the admission baseline used for the
    /// utilization ratio.
    pub fn new(normal_ccu: u64) -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            handled: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            active: AtomicU64::new(0),
            normal_ccu: normal_ccu.max(1),
        }
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_errored(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// Connection admitted: occupies a queue slot and an active-conn slot
    /// until the connection closes.
    pub(crate) fn conn_admitted(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Worker picked the connection up.
    pub(crate) fn conn_started(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
    }

    /// Connection finished (any path).
    pub(crate) fn conn_closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Roll back an admission that could not be queued.
    pub(crate) fn conn_unadmitted(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current active connections.
    pub fn active_conns(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Rejections so far.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    pub fn snapshot(&self) -> ServerMetricsSnapshot {
        let active = self.active.load(Ordering::Relaxed);
        ServerMetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            active_conns: active,
            current_ccu: active,
            normal_ccu: self.normal_ccu,
            utilization: active as f64 / self.normal_ccu as f64,
        }
    }
}
