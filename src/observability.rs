//! Metrics hooks for store-backed operations.
//!
//! Implement [`OpsMetrics`] to feed your monitoring system. Every method has
//! a default body that logs through the `log` crate, so an empty impl is a
//! working log-based collector:
//!
//! ```ignore
//! use bizops_kit::observability::OpsMetrics;
//!
//! struct LogMetrics;
//! impl OpsMetrics for LogMetrics {}
//!
//! let reconciler = Reconciler::new(store).with_metrics(Box::new(LogMetrics));
//! ```
//!
//! [`NoOpMetrics`] (the default) records nothing.
//!
//! # Hooks
//!
//! - `record_applied()` - a reconciliation write landed
//! - `record_skipped()` - target invoice or slot was gone; nothing written
//! - `record_conflict()` - compare-and-swap lost and will be retried
//! - `record_error()` - operation failed
//! - `record_advisor_call()` - external reasoning service round-trip

use std::sync::Arc;
use std::time::Duration;

/// Trait for operation metrics collection.
pub trait OpsMetrics: Send + Sync {
    /// Record a successful write.
    fn record_applied(&self, path: &str, duration: Duration) {
        debug!("Ops APPLIED: {} took {:?}", path, duration);
    }

    /// Record an operation that aborted without writing.
    fn record_skipped(&self, path: &str, reason: &str) {
        debug!("Ops SKIPPED: {} ({})", path, reason);
    }

    /// Record a lost compare-and-swap.
    fn record_conflict(&self, path: &str, attempt: u32) {
        warn!("Ops CONFLICT on {} (attempt {})", path, attempt);
    }

    /// Record an error.
    fn record_error(&self, path: &str, error: &str) {
        warn!("Ops ERROR for {}: {}", path, error);
    }

    /// Record an external advisor call.
    fn record_advisor_call(&self, flow: &str, duration: Duration, ok: bool) {
        debug!("Advisor {}: ok={} took {:?}", flow, ok, duration);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl OpsMetrics for NoOpMetrics {
    fn record_applied(&self, _path: &str, _duration: Duration) {}
    fn record_skipped(&self, _path: &str, _reason: &str) {}
    fn record_conflict(&self, _path: &str, _attempt: u32) {}
    fn record_error(&self, _path: &str, _error: &str) {}
    fn record_advisor_call(&self, _flow: &str, _duration: Duration, _ok: bool) {}
}

/// Shared handle; lets one collector serve several components.
impl<M: OpsMetrics + ?Sized> OpsMetrics for Arc<M> {
    fn record_applied(&self, path: &str, duration: Duration) {
        (**self).record_applied(path, duration)
    }
    fn record_skipped(&self, path: &str, reason: &str) {
        (**self).record_skipped(path, reason)
    }
    fn record_conflict(&self, path: &str, attempt: u32) {
        (**self).record_conflict(path, attempt)
    }
    fn record_error(&self, path: &str, error: &str) {
        (**self).record_error(path, error)
    }
    fn record_advisor_call(&self, flow: &str, duration: Duration, ok: bool) {
        (**self).record_advisor_call(flow, duration, ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counting {
        conflicts: AtomicU32,
    }

    impl OpsMetrics for Counting {
        fn record_conflict(&self, _path: &str, _attempt: u32) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_applied("invoices/1", Duration::from_millis(3));
        metrics.record_skipped("invoices/1", "missing");
        metrics.record_advisor_call("smartTaskAssignment", Duration::from_secs(1), true);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let metrics = Counting::default();
        metrics.record_conflict("invoices/1", 1);
        metrics.record_conflict("invoices/1", 2);
        metrics.record_error("invoices/1", "boom");
        assert_eq!(metrics.conflicts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shared_handle_delegates() {
        let shared = Arc::new(Counting::default());
        let boxed: Box<dyn OpsMetrics> = Box::new(shared.clone());
        boxed.record_conflict("invoices/1", 1);
        assert_eq!(shared.conflicts.load(Ordering::SeqCst), 1);
    }
}
