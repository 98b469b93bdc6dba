//! Aggregate worker-pool metrics (§4.8 "exposes `metrics`").

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct WorkerMetrics {
    pushed: AtomicU64,
    polled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerMetricsSnapshot {
    pub pushed: u64,
    pub polled: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub success_rate: f64,
}

impl WorkerMetrics {
    pub fn record_pushed(&self, n: u64) {
        self.pushed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_polled(&self, n: u64) {
        self.polled.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let polled = self.polled.load(Ordering::Relaxed);
        let success_rate = if polled == 0 { 1.0 } else { completed as f64 / polled as f64 };
        WorkerMetricsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            polled,
            completed,
            failed,
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            success_rate,
        }
    }

    /// Aggregates several workers' snapshots into one (§4.8: `metrics`
    /// is an aggregate across the pool).
    pub fn aggregate(snapshots: &[WorkerMetricsSnapshot]) -> WorkerMetricsSnapshot {
        let mut total = WorkerMetricsSnapshot::default();
        for s in snapshots {
            total.pushed += s.pushed;
            total.polled += s.polled;
            total.completed += s.completed;
            total.failed += s.failed;
            total.retried += s.retried;
            total.dead_lettered += s.dead_lettered;
        }
        total.success_rate = if total.polled == 0 { 1.0 } else { total.completed as f64 / total.polled as f64 };
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_one_with_no_traffic() {
        let metrics = WorkerMetrics::default();
        assert_eq!(metrics.snapshot().success_rate, 1.0);
    }

    #[test]
    fn success_rate_reflects_completed_over_polled() {
        let metrics = WorkerMetrics::default();
        metrics.record_polled(4);
        metrics.record_completed();
        metrics.record_completed();
        metrics.record_failed();
        assert_eq!(metrics.snapshot().success_rate, 0.5);
    }

    #[test]
    fn aggregate_sums_across_workers() {
        let a = WorkerMetrics::default();
        a.record_polled(2);
        a.record_completed();
        let b = WorkerMetrics::default();
        b.record_polled(3);
        b.record_completed();
        b.record_completed();

        let total = WorkerMetrics::aggregate(&[a.snapshot(), b.snapshot()]);
        assert_eq!(total.polled, 5);
        assert_eq!(total.completed, 3);
    }
}
