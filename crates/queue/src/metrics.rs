//! Queue metrics (supplemental, §11 of the expanded spec).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QueueMetricsSnapshot {
    pub pushed: u64,
    pub polled: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

impl QueueMetricsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.completed + self.failed == 0 {
            1.0
        } else {
            self.completed as f64 / (self.completed + self.failed) as f64
        }
    }
}

/// Shared atomic counters a `QueueClient` updates on every operation.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pushed: AtomicU64,
    polled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl QueueMetrics {
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

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            polled: self.polled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_with_no_activity_is_one() {
        let snap = QueueMetricsSnapshot::default();
        assert_eq!(snap.success_rate(), 1.0);
    }

    #[test]
    fn success_rate_reflects_completed_vs_failed() {
        let m = QueueMetrics::default();
        m.record_completed();
        m.record_completed();
        m.record_completed();
        m.record_failed();
        let snap = m.snapshot();
        assert!((snap.success_rate() - 0.75).abs() < f64::EPSILON);
    }
}
