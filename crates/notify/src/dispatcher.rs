//! Async webhook dispatcher (C9, §4.9).
//!
//! Non-blocking fan-out from the ingestion path: `emit` places events on a
//! bounded queue and returns immediately; a pool of dispatch workers pops
//! events and delivers them to internal in-process handlers (always) and
//! external HTTP targets (gated by a circuit breaker, with retry on
//! network errors and 5xx only).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kairos_core::config::WebhookConfig;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::circuit::CircuitBreaker;
use crate::error::NotifyError;
use crate::event::IngestEvent;
use crate::metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
use crate::target::{post_event, InternalHandler, PostOutcome, WebhookTarget};

pub struct WebhookDispatcher {
    sender: mpsc::Sender<IngestEvent>,
    receiver: Arc<Mutex<mpsc::Receiver<IngestEvent>>>,
    targets: Arc<Vec<WebhookTarget>>,
    internal_handlers: Arc<Vec<Arc<dyn InternalHandler>>>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<DispatcherMetrics>,
    http: reqwest::Client,
    max_retries: u32,
    request_timeout_secs: u64,
    shutdown_drain_secs: u64,
    shutting_down: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    dispatch_workers: u32,
}

impl WebhookDispatcher {
    pub fn new(
        config: &WebhookConfig,
        targets: Vec<WebhookTarget>,
        internal_handlers: Vec<Arc<dyn InternalHandler>>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            targets: Arc::new(targets),
            internal_handlers: Arc::new(internal_handlers),
            breaker: Arc::new(CircuitBreaker::new(config.circuit_breaker_threshold, config.circuit_breaker_reset_secs)),
            metrics: Arc::new(DispatcherMetrics::default()),
            http: reqwest::Client::new(),
            max_retries: config.max_retries,
            request_timeout_secs: config.request_timeout_secs,
            shutdown_drain_secs: config.shutdown_drain_secs,
            shutting_down: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            dispatch_workers: config.dispatch_workers,
        }
    }

    /// Non-blocking: places `event` on the bounded queue. Ingestion MUST
    /// NEVER be blocked by webhook slowness, so a full queue drops the
    /// event with an error log rather than waiting.
    pub fn emit(&self, event: IngestEvent) -> Result<(), NotifyError> {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.metrics.record_queue_size(self.sender.max_capacity() - self.sender.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(evt)) => {
                tracing::error!(event_id = %evt.id, kind = %evt.kind, "webhook queue full, dropping event");
                Err(NotifyError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(evt)) => {
                tracing::error!(event_id = %evt.id, "webhook dispatcher is shut down, dropping event");
                Err(NotifyError::QueueFull)
            }
        }
    }

    /// Spawns the configured number of dispatch workers popping from the
    /// shared queue. Each call to `start` adds workers; callers typically
    /// call it once.
    pub async fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().await;
        for worker_idx in 0..self.dispatch_workers {
            let this = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                this.worker_loop(worker_idx).await;
            }));
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_idx: u32) {
        loop {
            let event = {
                let mut rx = self.receiver.lock().await;
                rx.recv().await
            };
            let Some(event) = event else {
                tracing::debug!(worker_idx, "webhook dispatch worker exiting, queue closed");
                return;
            };
            self.metrics.record_queue_size(self.sender.max_capacity() - self.sender.capacity());
            self.dispatch_one(&event).await;
        }
    }

    async fn dispatch_one(&self, event: &IngestEvent) {
        for handler in self.internal_handlers.iter() {
            handler.handle(event).await;
        }

        if self.targets.is_empty() {
            return;
        }

        let circuit_open = self.breaker.is_open();
        self.metrics.set_circuit_open(circuit_open);
        if circuit_open {
            tracing::debug!(event_id = %event.id, "circuit open, skipping external targets");
            return;
        }

        for target in self.targets.iter() {
            self.dispatch_to_target(target, event).await;
        }
    }

    async fn dispatch_to_target(&self, target: &WebhookTarget, event: &IngestEvent) {
        for attempt in 0..=self.max_retries {
            match post_event(&self.http, target, event, self.request_timeout_secs).await {
                PostOutcome::Success => {
                    self.breaker.record_success();
                    self.metrics.record_dispatched();
                    return;
                }
                PostOutcome::Terminal(status) => {
                    tracing::warn!(target = %target.name, event_id = %event.id, status, "webhook terminal failure, not retrying");
                    self.metrics.record_failed();
                    return;
                }
                PostOutcome::Retriable(reason) => {
                    if attempt < self.max_retries {
                        self.metrics.record_retried();
                        let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                        tracing::warn!(target = %target.name, event_id = %event.id, attempt, reason, "webhook retriable failure, backing off");
                        tokio::time::sleep(backoff).await;
                    } else {
                        tracing::error!(target = %target.name, event_id = %event.id, reason, "webhook retries exhausted");
                        self.breaker.record_failure();
                        self.metrics.record_failed();
                    }
                }
            }
        }
    }

    pub fn metrics(&self) -> DispatcherMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop accepting new events, allow up to `shutdown_drain_secs` for the
    /// queue to drain, then cancel remaining workers.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut workers = self.workers.lock().await;
        let drain = Duration::from_secs(self.shutdown_drain_secs);

        for handle in workers.drain(..) {
            match tokio::time::timeout(drain, handle).await {
                Ok(_) => {}
                Err(_) => tracing::warn!("webhook dispatch worker did not drain in time, cancelling"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    fn config(capacity: usize) -> WebhookConfig {
        WebhookConfig {
            queue_capacity: capacity,
            dispatch_workers: 1,
            max_retries: 2,
            circuit_breaker_threshold: 2,
            circuit_breaker_reset_secs: 60,
            request_timeout_secs: 5,
            shutdown_drain_secs: 1,
        }
    }

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        signal: Mutex<Option<oneshot::Sender<()>>>,
    }

    #[async_trait::async_trait]
    impl InternalHandler for CountingHandler {
        async fn handle(&self, _event: &IngestEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = self.signal.lock().await.take() {
                let _ = tx.send(());
            }
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn emit_is_non_blocking_and_internal_handler_runs() {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let handler = Arc::new(CountingHandler { count: count.clone(), signal: Mutex::new(Some(tx)) });

        let dispatcher = Arc::new(WebhookDispatcher::new(&config(10), Vec::new(), vec![handler]));
        dispatcher.start().await;

        dispatcher.emit(IngestEvent::new("entity.merged", Some("t".to_string()), serde_json::json!({}))).unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn full_queue_drops_with_error() {
        let dispatcher = WebhookDispatcher::new(&config(1), Vec::new(), Vec::new());
        // No worker started, so the one slot fills and the next try_send fails.
        dispatcher.emit(IngestEvent::new("k", None, serde_json::json!({}))).unwrap();
        let result = dispatcher.emit(IngestEvent::new("k", None, serde_json::json!({})));
        assert!(matches!(result, Err(NotifyError::QueueFull)));
    }
}
