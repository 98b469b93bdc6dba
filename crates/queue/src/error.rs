//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("queue not found: {0}")]
    NotFound(String),

    #[error("broker error (status {status}): {body}")]
    Provider { status: u16, body: String },

    /// The `poll_tag` presented no longer matches — visibility expired and
    /// another consumer polled the message. Non-retriable for this caller.
    #[error("stale poll tag for message {0}")]
    Stale(i64),
}
