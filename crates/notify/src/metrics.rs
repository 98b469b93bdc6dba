//! Dispatcher metrics (§4.9).

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

#[derive(Default)]
pub struct DispatcherMetrics {
    dispatched: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    queue_size: AtomicUsize,
    queue_max_size_seen: AtomicUsize,
    circuit_open: AtomicUsize,
    last_error_time: AtomicI64,
    last_success_time: AtomicI64,
}

#[derive(Debug, Clone, Default)]
pub struct DispatcherMetricsSnapshot {
    pub dispatched: u64,
    pub failed: u64,
    pub retried: u64,
    pub queue_size: usize,
    pub queue_max_size_seen: usize,
    pub circuit_open: bool,
    pub last_error_time: Option<i64>,
    pub last_success_time: Option<i64>,
}

impl DispatcherMetrics {
    pub fn record_queue_size(&self, size: usize) {
        self.queue_size.store(size, Ordering::Relaxed);
        self.queue_max_size_seen.fetch_max(size, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.last_success_time.store(now_epoch(), Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.last_error_time.store(now_epoch(), Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_circuit_open(&self, open: bool) {
        self.circuit_open.store(open as usize, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatcherMetricsSnapshot {
        let last_error = self.last_error_time.load(Ordering::Relaxed);
        let last_success = self.last_success_time.load(Ordering::Relaxed);
        DispatcherMetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            queue_size: self.queue_size.load(Ordering::Relaxed),
            queue_max_size_seen: self.queue_max_size_seen.load(Ordering::Relaxed),
            circuit_open: self.circuit_open.load(Ordering::Relaxed) != 0,
            last_error_time: (last_error != 0).then_some(last_error),
            last_success_time: (last_success != 0).then_some(last_success),
        }
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
