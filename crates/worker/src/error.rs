//! Worker-local error type and the §4.7.2/§4.7.3 failure classification.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error(transparent)]
    RateLimited(#[from] kairos_ratelimit::RateLimitError),

    #[error(transparent)]
    Queue(#[from] kairos_queue::QueueError),

    #[error(transparent)]
    Graph(#[from] kairos_graph::GraphError),

    #[error(transparent)]
    Dedup(#[from] kairos_dedup::DedupError),

    #[error(transparent)]
    Merge(#[from] kairos_merge::MergeError),

    #[error(transparent)]
    Llm(#[from] kairos_llm::LlmError),

    #[error("malformed task payload: {0}")]
    BadPayload(String),
}

/// How a dispatch failure should be handled by the worker loop (§4.7.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Route straight to the DLQ, no retry.
    Permanent,
    /// Extend visibility and retry, up to `max_retries`.
    Transient,
    /// Not actually a failure — treat the task as completed.
    Success,
}

/// Classify a dispatch error per §4.7.3's substring heuristics, applied
/// over both the error's message and, for a couple of kind-specific
/// cases, the task kind that produced it.
pub fn classify(err: &WorkerError, kind: kairos_core::TaskKind) -> FailureClass {
    if matches!(err, WorkerError::Permanent(_)) {
        return FailureClass::Permanent;
    }
    if matches!(err, WorkerError::RateLimited(_)) {
        // Handled separately by the worker loop via `extend`, never DLQ'd
        // here, but classify as transient for callers that don't special-case it.
        return FailureClass::Transient;
    }

    let message = err.to_string().to_lowercase();

    if message.contains("rate limit") {
        return FailureClass::Transient;
    }
    if message.contains("duplicate") && kind == kairos_core::TaskKind::Entity {
        return FailureClass::Success;
    }
    if message.contains("not found") && kind == kairos_core::TaskKind::Relationship {
        return FailureClass::Success;
    }
    if message.contains("connection") || message.contains("timeout") {
        return FailureClass::Transient;
    }

    match err {
        WorkerError::Transient(_) => FailureClass::Transient,
        WorkerError::Queue(_) | WorkerError::Llm(_) => FailureClass::Transient,
        WorkerError::Graph(_) | WorkerError::Dedup(_) | WorkerError::Merge(_) => FailureClass::Transient,
        WorkerError::BadPayload(_) => FailureClass::Permanent,
        _ => FailureClass::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::TaskKind;

    #[test]
    fn rate_limit_message_classifies_as_transient() {
        let err = WorkerError::Transient("upstream rate limit hit".to_string());
        assert_eq!(classify(&err, TaskKind::Episode), FailureClass::Transient);
    }

    #[test]
    fn duplicate_entity_save_is_success() {
        let err = WorkerError::Transient("duplicate key violation".to_string());
        assert_eq!(classify(&err, TaskKind::Entity), FailureClass::Success);
    }

    #[test]
    fn not_found_on_relationship_is_success() {
        let err = WorkerError::Transient("edge not found".to_string());
        assert_eq!(classify(&err, TaskKind::Relationship), FailureClass::Success);
    }

    #[test]
    fn connection_error_is_transient() {
        let err = WorkerError::Transient("connection reset by peer".to_string());
        assert_eq!(classify(&err, TaskKind::Episode), FailureClass::Transient);
    }

    #[test]
    fn explicit_permanent_wins_regardless_of_message() {
        let err = WorkerError::Permanent("schema validation failed".to_string());
        assert_eq!(classify(&err, TaskKind::Episode), FailureClass::Permanent);
    }
}
