//! Sliding-window admission control.
//!
//! The controller is a smoothing layer in front of the bounded queues: it
//! rejects new work once sustained load exceeds a configured "normal
//! capacity". It is not the hard limit (the bounded queue is); it keeps
//! short bursts from monopolizing queue space for a whole window.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;

// Layer 3: Internal module imports
// (none)

/// Default reset window for the admission counter.
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(60);

/// Atomic admission counter with periodic reset.
///
/// `try_acquire` admits work while the windowed load stays below
/// `normal_capacity`; the counter zeroes itself once the reset interval has
/// elapsed. In the default server wiring `normal_capacity` is
/// `workers + queue_capacity`.
///
/// # Example
///
/// ```rust
/// use fluxor_rt::backpressure::BackpressureController;
/// use std::time::Duration;
///
/// let controller = BackpressureController::new(2, Duration::from_secs(60));
/// assert!(controller.try_acquire());
/// assert!(controller.try_acquire());
/// assert!(!controller.try_acquire()); // over normal capacity
/// controller.release();
/// assert!(controller.try_acquire());
/// ```
#[derive(Debug)]
pub struct BackpressureController {
    normal_capacity: u64,
    reset_interval_ms: i64,
    load: AtomicI64,
    rejected: AtomicU64,
    last_reset_ms: AtomicI64,
}

/// Snapshot of controller state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackpressureMetrics {
    /// Configured admission baseline
    pub normal_capacity: u64,
    /// Load admitted in the current window
    pub current_load: i64,
    /// Admissions rejected since creation
    pub rejected: u64,
    /// Load as a fraction of normal capacity (1.0 = at baseline)
    pub utilization: f64,
}

impl BackpressureController {
    /// Create a controller admitting up to `normal_capacity` concurrent
    /// acquisitions per window.
    pub fn new(normal_capacity: u64, reset_interval: Duration) -> Self {
        Self {
            normal_capacity: normal_capacity.max(1),
            reset_interval_ms: reset_interval.as_millis() as i64,
            load: AtomicI64::new(0),
            rejected: AtomicU64::new(0),
            last_reset_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// Create a controller with the default 60s window.
    pub fn with_capacity(normal_capacity: u64) -> Self {
        Self::new(normal_capacity, DEFAULT_RESET_INTERVAL)
    }

    /// Default wiring for a server front: `workers + queue_capacity`.
    pub fn for_pool(workers: usize, queue_capacity: usize) -> Self {
        Self::with_capacity((workers + queue_capacity) as u64)
    }

    /// Try to admit one unit of work.
    ///
    /// Zeroes the counter first when a reset interval has elapsed (CAS on the
    /// reset timestamp, so exactly one caller performs the reset). Returns
    /// `false` and counts a rejection once the windowed load reaches the
    /// baseline.
    pub fn try_acquire(&self) -> bool {
        let now = Utc::now().timestamp_millis();
        let last = self.last_reset_ms.load(Ordering::Acquire);
        if now - last >= self.reset_interval_ms
            && self
                .last_reset_ms
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.load.store(0, Ordering::Release);
        }

        if self.load.load(Ordering::Acquire) >= self.normal_capacity as i64 {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.load.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Release one previously acquired unit. Clamped at zero so releases
    /// arriving after a window reset cannot drive the load negative.
    pub fn release(&self) {
        let _ = self
            .load
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some((v - 1).max(0))
            });
    }

    /// Configured baseline.
    pub fn normal_capacity(&self) -> u64 {
        self.normal_capacity
    }

    /// Snapshot of current state.
    pub fn metrics(&self) -> BackpressureMetrics {
        let current_load = self.load.load(Ordering::Acquire);
        BackpressureMetrics {
            normal_capacity: self.normal_capacity,
            current_load,
            rejected: self.rejected.load(Ordering::Relaxed),
            utilization: current_load.max(0) as f64 / self.normal_capacity as f64,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_capacity() {
        let controller = BackpressureController::with_capacity(3);
        assert!(controller.try_acquire());
        assert!(controller.try_acquire());
        assert!(controller.try_acquire());
        assert!(!controller.try_acquire());
        assert_eq!(controller.metrics().rejected, 1);
    }

    #[test]
    fn test_release_frees_capacity() {
        let controller = BackpressureController::with_capacity(1);
        assert!(controller.try_acquire());
        assert!(!controller.try_acquire());
        controller.release();
        assert!(controller.try_acquire());
    }

    #[test]
    fn test_release_clamps_at_zero() {
        let controller = BackpressureController::with_capacity(2);
        controller.release();
        controller.release();
        assert_eq!(controller.metrics().current_load, 0);
        // Still admits the full baseline afterwards.
        assert!(controller.try_acquire());
        assert!(controller.try_acquire());
        assert!(!controller.try_acquire());
    }

    #[test]
    fn test_window_reset_zeroes_load() {
        let controller = BackpressureController::new(1, Duration::from_millis(20));
        assert!(controller.try_acquire());
        assert!(!controller.try_acquire());

        std::thread::sleep(Duration::from_millis(30));
        assert!(controller.try_acquire()); // new window
    }

    #[test]
    fn test_for_pool_wiring() {
        let controller = BackpressureController::for_pool(4, 16);
        assert_eq!(controller.normal_capacity(), 20);
    }

    #[test]
    fn test_metrics_utilization() {
        let controller = BackpressureController::with_capacity(4);
        controller.try_acquire();
        controller.try_acquire();
        let metrics = controller.metrics();
        assert_eq!(metrics.current_load, 2);
        assert!((metrics.utilization - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let controller = BackpressureController::with_capacity(0);
        assert_eq!(controller.normal_capacity(), 1);
    }
}
