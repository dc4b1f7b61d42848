//! Dispatch metrics.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use nudge_core::WakeupKind;

/// Metric names exported through the `metrics` facade.
pub mod names {
    /// Counter: wakeups submitted to the gateway, labeled by `kind`.
    pub const OUTBOUND_TOTAL: &str = "nudge_wakeups_outbound_total";
    /// Counter: delivery reports processed, labeled by `result`.
    pub const SENT_TOTAL: &str = "nudge_wakeups_sent_total";
}

/// Counter handle shared by the dispatcher and the reconciler.
///
/// Cheap to clone; injected at construction rather than looked up through a
/// global registry. Increments land both in a local atomic set (snapshots
/// for the stats endpoint and shutdown logging) and in the `metrics` facade
/// for the Prometheus exporter.
#[derive(Debug, Clone, Default)]
pub struct DispatchMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    outbound_receipt: AtomicU64,
    outbound_notification: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    unregistered: AtomicU64,
    canonical: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a wakeup submitted to the gateway.
    pub fn mark_outbound(&self, kind: WakeupKind) {
        let cell = match kind {
            WakeupKind::Receipt => &self.inner.outbound_receipt,
            WakeupKind::Notification => &self.inner.outbound_notification,
        };
        cell.fetch_add(1, Ordering::Relaxed);
        counter!(names::OUTBOUND_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    /// Mark a wakeup the provider accepted for delivery.
    pub fn mark_success(&self) {
        self.mark_sent(&self.inner.success, "success");
    }

    /// Mark a wakeup the provider rejected with a structured error.
    pub fn mark_failure(&self) {
        self.mark_sent(&self.inner.failure, "failure");
    }

    /// Mark a report that the destination is no longer registered.
    pub fn mark_unregistered(&self) {
        self.mark_sent(&self.inner.unregistered, "unregistered");
    }

    /// Mark a canonical registration-id rotation report.
    pub fn mark_canonical(&self) {
        self.mark_sent(&self.inner.canonical, "canonical");
    }

    fn mark_sent(&self, cell: &AtomicU64, result: &'static str) {
        cell.fetch_add(1, Ordering::Relaxed);
        counter!(names::SENT_TOTAL, "result" => result).increment(1);
    }

    /// Point-in-time view of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            outbound_receipt: self.inner.outbound_receipt.load(Ordering::Relaxed),
            outbound_notification: self.inner.outbound_notification.load(Ordering::Relaxed),
            success: self.inner.success.load(Ordering::Relaxed),
            failure: self.inner.failure.load(Ordering::Relaxed),
            unregistered: self.inner.unregistered.load(Ordering::Relaxed),
            canonical: self.inner.canonical.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub outbound_receipt: u64,
    pub outbound_notification: u64,
    pub success: u64,
    pub failure: u64,
    pub unregistered: u64,
    pub canonical: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_increments() {
        let metrics = DispatchMetrics::new();

        metrics.mark_outbound(WakeupKind::Receipt);
        metrics.mark_outbound(WakeupKind::Notification);
        metrics.mark_outbound(WakeupKind::Notification);
        metrics.mark_success();
        metrics.mark_unregistered();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                outbound_receipt: 1,
                outbound_notification: 2,
                success: 1,
                failure: 0,
                unregistered: 1,
                canonical: 0,
            }
        );
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = DispatchMetrics::new();
        let clone = metrics.clone();

        clone.mark_failure();
        clone.mark_canonical();

        assert_eq!(metrics.snapshot().failure, 1);
        assert_eq!(metrics.snapshot().canonical, 1);
    }
}
