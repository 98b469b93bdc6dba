//! Async webhook dispatch for post-ingestion events (§4.9).
//!
//! Ingestion never blocks on this crate: `WebhookDispatcher::emit` is a
//! non-blocking enqueue, delivery happens on a separate worker pool, and a
//! circuit breaker sheds external load when a target is unhealthy.

pub mod circuit;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod metrics;
pub mod target;

pub use circuit::CircuitBreaker;
pub use dispatcher::WebhookDispatcher;
pub use error::NotifyError;
pub use event::IngestEvent;
pub use metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
pub use target::{post_event, InternalHandler, PostOutcome, WebhookTarget};
