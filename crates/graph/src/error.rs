//! Graph driver error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("graph backend not configured")]
    NotConfigured,
}
