//! `kairos-worker` — loads [`kairos_core::Config`], wires the shared
//! queue/rate-limiter/graph/notify clients, and runs the [`WorkerPool`]
//! until SIGINT/SIGTERM (§4.8). A thin `clap` CLI over env-driven
//! config, `tracing-subscriber` init, then hand off to the long-running
//! service.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kairos_core::config::Config;
use kairos_graph::{GraphBackend, GraphDriver, InMemoryGraphDriver};
use kairos_notify::WebhookDispatcher;
use kairos_queue::HttpBrokerClient;
use kairos_ratelimit::RateLimiter;
use kairos_worker::{default_hook_registry, IngestionWorker, WorkerContext, WorkerPool};

/// The ingestion worker pool — polls the queue, dedups and merges
/// extracted entities, writes to the graph store, and fans out webhook
/// notifications.
#[derive(Parser, Debug)]
#[command(name = "kairos-worker", version, about)]
struct Cli {
    /// Named config profile (`KAIROS_PROFILE` if unset); see
    /// `Config::available_profiles`.
    #[arg(long, env = "KAIROS_PROFILE", default_value = "")]
    profile: String,

    /// Override the worker count from `WORKER_COUNT`.
    #[arg(long)]
    worker_count: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    kairos_core::config::load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::for_profile(&cli.profile);
    if let Some(n) = cli.worker_count {
        config.worker.worker_count = n;
    }
    config.log_summary();
    let config = Arc::new(config);

    let queue = Arc::new(HttpBrokerClient::new(
        config.queue.broker_url.clone(),
        config.queue.request_timeout_secs,
    ));
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let store = Arc::new(InMemoryGraphDriver::default());
    let backend: GraphBackend = config.graph.backend.parse().unwrap_or(GraphBackend::Memory);
    store
        .ensure_constraints(backend, &config.graph.graph_key())
        .await
        .context("failed to ensure graph constraints")?;

    let notify = if config.webhook.dispatch_workers > 0 {
        let dispatcher = Arc::new(WebhookDispatcher::new(&config.webhook, Vec::new(), Vec::new()));
        dispatcher.start().await;
        Some(dispatcher)
    } else {
        None
    };

    let ctx = WorkerContext {
        store,
        llm: None,
        centrality: None,
        notify,
        config: config.clone(),
        hooks: Arc::new(default_hook_registry()),
    };

    let mut workers = Vec::with_capacity(config.worker.worker_count as usize);
    for idx in 0..config.worker.worker_count {
        workers.push(IngestionWorker::new(
            format!("worker-{idx}"),
            queue.clone(),
            config.queue.queue_name.clone(),
            config.queue.dlq_name.clone(),
            limiter.clone(),
            ctx.clone(),
            &config.worker,
        ));
    }

    let pool = WorkerPool::new(workers, config.worker.shutdown_drain_secs);
    tracing::info!(workers = config.worker.worker_count, "kairos-worker starting");
    pool.run_until_signal().await;
    tracing::info!("kairos-worker exited cleanly");
    Ok(())
}
