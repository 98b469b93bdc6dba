//! The ingestion worker loop (C7) and pool lifecycle (C8), §4.7–§4.8.
//!
//! Poll a batch, admit through the rate limiter, dispatch by kind, ack
//! on success, extend on rate-limit/transient failure, DLQ on permanent/
//! exhausted failure. One tokio task per worker, signal-driven shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kairos_core::config::WorkerConfig;
use kairos_core::{IngestionTask, TaskPriority};
use kairos_queue::QueueClient;
use kairos_ratelimit::{RateLimitError, RateLimiter};
use tokio::sync::{watch, Mutex};

use crate::dispatch::{dispatch, WorkerContext};
use crate::error::{classify, FailureClass, WorkerError};
use crate::metrics::{WorkerMetrics, WorkerMetricsSnapshot};

/// One logical worker: owns a `worker_id`, shares the queue client, rate
/// limiter, and dispatch context with its siblings in the pool.
pub struct IngestionWorker {
    pub worker_id: String,
    queue: Arc<dyn QueueClient>,
    queue_name: String,
    dlq_name: String,
    limiter: Arc<RateLimiter>,
    ctx: WorkerContext,
    batch_size: u32,
    poll_interval: Duration,
    visibility_timeout_secs: u64,
    default_max_retries: u32,
    /// Local retry-count tracking keyed by broker message id. The broker
    /// contract extends visibility without letting the client rewrite
    /// message contents, so `IngestionTask::retry_count` on the polled
    /// copy can't be persisted between polls — the worker tracks it here
    /// instead, seeded from the task's own field the first time it's seen.
    retry_counts: Mutex<HashMap<i64, u32>>,
    metrics: Arc<WorkerMetrics>,
}

impl IngestionWorker {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<dyn QueueClient>,
        queue_name: impl Into<String>,
        dlq_name: impl Into<String>,
        limiter: Arc<RateLimiter>,
        ctx: WorkerContext,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            queue_name: queue_name.into(),
            dlq_name: dlq_name.into(),
            limiter,
            ctx,
            batch_size: config.batch_size,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            visibility_timeout_secs: 300,
            default_max_retries: config.default_max_retries,
            retry_counts: Mutex::new(HashMap::new()),
            metrics: Arc::new(WorkerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs the poll loop until `shutdown` reports `true`. The loop head
    /// is the only cancellation point: an in-flight task is never
    /// interrupted mid-dispatch, per §5 "cancellation and timeouts".
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                tracing::info!(worker_id = %self.worker_id, "shutdown signal observed, exiting poll loop");
                return;
            }

            let messages = match self.queue.poll(&self.queue_name, self.batch_size, self.visibility_timeout_secs).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(worker_id = %self.worker_id, error = %e, "poll failed, backing off");
                    Vec::new()
                }
            };

            if messages.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            self.metrics.record_polled(messages.len() as u64);
            for message in messages {
                self.process_one(message.message_id, message.poll_tag, message.task).await;
            }
        }
    }

    async fn process_one(&self, message_id: i64, poll_tag: String, task: IngestionTask) {
        let retry_count = self.retry_count_for(message_id, &task).await;

        if let Err(rate_err) = self.limiter.acquire(task.tenant.as_deref()) {
            self.extend_after_rate_limit(message_id, &poll_tag, retry_count, rate_err).await;
            return;
        }

        match dispatch(&self.ctx, &task).await {
            Ok(()) => {
                let _ = self.queue.ack(&self.queue_name, message_id, &poll_tag).await;
                self.retry_counts.lock().await.remove(&message_id);
                self.metrics.record_completed();
            }
            Err(err) => self.handle_failure(message_id, poll_tag, task, retry_count, err).await,
        }
    }

    async fn retry_count_for(&self, message_id: i64, task: &IngestionTask) -> u32 {
        let mut counts = self.retry_counts.lock().await;
        *counts.entry(message_id).or_insert(task.retry_count)
    }

    /// §4.7 pseudocode: `delay = min(300, retry_after * 2^retry_count)`.
    async fn extend_after_rate_limit(&self, message_id: i64, poll_tag: &str, retry_count: u32, err: RateLimitError) {
        let retry_after = match &err {
            RateLimitError::Exceeded { retry_after_secs, .. } => *retry_after_secs,
            RateLimitError::Suspended { retry_after_secs, .. } => *retry_after_secs,
        };
        let delay = retry_after.saturating_mul(1u64 << retry_count.min(20)).min(300);
        tracing::debug!(worker_id = %self.worker_id, message_id, %err, delay, "rate limited, extending visibility");
        let _ = self.queue.extend(&self.queue_name, message_id, poll_tag, delay).await;
        self.metrics.record_retried();
    }

    /// §4.7.2 failure handling: permanent → DLQ; transient with budget
    /// left → extend with exponential backoff; transient exhausted →
    /// DLQ; "success" classifications (duplicate entity, not-found edge)
    /// ack as if the dispatch had succeeded.
    async fn handle_failure(&self, message_id: i64, poll_tag: String, task: IngestionTask, retry_count: u32, err: WorkerError) {
        match classify(&err, task.kind) {
            FailureClass::Success => {
                let _ = self.queue.ack(&self.queue_name, message_id, &poll_tag).await;
                self.retry_counts.lock().await.remove(&message_id);
                self.metrics.record_completed();
            }
            FailureClass::Permanent => {
                self.dead_letter(message_id, &poll_tag, task, "PermanentError", &err).await;
            }
            FailureClass::Transient => {
                let max_retries = if task.max_retries > 0 { task.max_retries } else { self.default_max_retries };
                // §4.7.2 / §8 scenario 4: increment before computing the
                // delay and before the budget check, matching the
                // original's `retry_count += 1` preceding both.
                let retry_count = retry_count + 1;
                if retry_count < max_retries {
                    let delay = (10u64.saturating_mul(1u64 << retry_count.min(20))).min(300);
                    tracing::warn!(worker_id = %self.worker_id, message_id, retry_count, delay, error = %err, "transient failure, extending visibility");
                    let _ = self.queue.extend(&self.queue_name, message_id, &poll_tag, delay).await;
                    self.retry_counts.lock().await.insert(message_id, retry_count);
                    self.metrics.record_retried();
                } else {
                    self.dead_letter(message_id, &poll_tag, task, "TransientError", &err).await;
                }
            }
        }
    }

    async fn dead_letter(&self, message_id: i64, poll_tag: &str, mut task: IngestionTask, error_type: &str, err: &WorkerError) {
        task.metadata.insert("error_type".to_string(), serde_json::json!(error_type));
        task.metadata.insert("error_message".to_string(), serde_json::json!(err.to_string()));
        task.metadata.insert("failed_at".to_string(), serde_json::json!(chrono::Utc::now().to_rfc3339()));
        task.metadata.insert("worker_id".to_string(), serde_json::json!(self.worker_id));

        if let Err(e) = self.queue.enqueue(&self.dlq_name, &[task], 300).await {
            tracing::error!(worker_id = %self.worker_id, message_id, error = %e, "failed to write dead-letter entry");
        }
        let _ = self.queue.ack(&self.queue_name, message_id, poll_tag).await;
        self.retry_counts.lock().await.remove(&message_id);
        self.metrics.record_failed();
        self.metrics.record_dead_lettered();
        tracing::error!(worker_id = %self.worker_id, message_id, error_type, error = %err, "task routed to dead-letter queue");
    }
}

/// Lifecycle owner for N [`IngestionWorker`]s sharing a queue client, rate
/// limiter, and graph/LLM/centrality handles (§4.8).
pub struct WorkerPool {
    workers: Vec<Arc<IngestionWorker>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    shutdown_drain_secs: u64,
}

impl WorkerPool {
    pub fn new(workers: Vec<IngestionWorker>, shutdown_drain_secs: u64) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            workers: workers.into_iter().map(Arc::new).collect(),
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
            shutdown_drain_secs,
        }
    }

    /// Spawns every worker's poll loop as its own task.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for worker in &self.workers {
            let worker = Arc::clone(worker);
            let shutdown_rx = self.shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                worker.run(shutdown_rx).await;
            }));
        }
        tracing::info!(worker_count = self.workers.len(), "worker pool started");
    }

    /// Signals every worker to stop polling, then waits up to
    /// `shutdown_drain_secs` for in-flight tasks to finish before
    /// abandoning remaining handles.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut handles = self.handles.lock().await;
        let drain = Duration::from_secs(self.shutdown_drain_secs);
        for handle in handles.drain(..) {
            if tokio::time::timeout(drain, handle).await.is_err() {
                tracing::warn!("worker did not drain within shutdown window, abandoning");
            }
        }
        tracing::info!("worker pool stopped");
    }

    /// Aggregate metrics across every worker (§4.8 `metrics`).
    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        let snapshots: Vec<_> = self.workers.iter().map(|w| w.metrics()).collect();
        WorkerMetrics::aggregate(&snapshots)
    }

    /// Blocks until SIGINT/SIGTERM, then performs a graceful `stop()`
    /// (§4.8 "Handles process-level SIGINT/SIGTERM → graceful stop").
    #[cfg(unix)]
    pub async fn run_until_signal(&self) {
        use tokio::signal::unix::{signal, SignalKind};
        self.start().await;

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
        self.stop().await;
    }

    #[cfg(not(unix))]
    pub async fn run_until_signal(&self) {
        self.start().await;
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c");
        self.stop().await;
    }
}

/// Translate a producer-facing priority into the envelope's integer
/// ranking used by [`kairos_queue::envelope::sort_by_priority`].
pub fn priority_rank(priority: TaskPriority) -> i32 {
    priority as i32
}
