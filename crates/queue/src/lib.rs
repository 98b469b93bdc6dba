pub mod client;
pub mod envelope;
pub mod error;
pub mod metrics;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{AckOutcome, ExtendOutcome, HttpBrokerClient, QueueClient, QueueStats};
pub use envelope::{decode_message, encode_task, sort_by_priority, PolledMessage, RawMessage, TaskEnvelope};
pub use error::QueueError;
pub use metrics::{QueueMetrics, QueueMetricsSnapshot};
