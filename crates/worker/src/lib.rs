//! The ingestion worker (C7) and worker pool (C8), §4.7–§4.8.
//!
//! Wires `kairos-queue`, `kairos-ratelimit`, `kairos-graph`,
//! `kairos-dedup`, `kairos-merge`, `kairos-validation`, `kairos-llm`, and
//! `kairos-notify` together into the poll → rate-limit → dispatch → ack/
//! extend/DLQ loop (§4.7), run N-wide by [`WorkerPool`].

pub mod dispatch;
pub mod error;
pub mod extraction;
pub mod metrics;
pub mod pool;

pub use dispatch::{default_hook_registry, dispatch, WorkerContext};
pub use error::{classify, FailureClass, WorkerError};
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
pub use pool::{priority_rank, IngestionWorker, WorkerPool};
