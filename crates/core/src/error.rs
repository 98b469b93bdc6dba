use thiserror::Error;

/// The error taxonomy surfaced by the ingestion core (§7).
///
/// Lower layers raise these; the worker is the single point that
/// classifies, counts, and decides retry/DLQ/ack.
#[derive(Error, Debug)]
pub enum KairosError {
    #[error("rate limited on {scope}, retry after {retry_after_secs}s")]
    RateLimited {
        scope: String,
        retry_after_secs: u64,
    },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent error: {0}")]
    Permanent(String),

    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("merge error: {0}")]
    Merge(String),

    /// The poll_tag presented no longer matches; another consumer owns
    /// the message now. Treated as silent success by the current worker.
    #[error("stale poll tag")]
    StaleTag,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl KairosError {
    /// Best-effort classification from a free-text message, mirroring the
    /// substring heuristics a failing handler's error message is matched
    /// against before a retry/DLQ decision is made (§4.7.3).
    pub fn classify_message(msg: &str) -> KairosError {
        let lower = msg.to_lowercase();
        if lower.contains("rate limit") {
            KairosError::RateLimited {
                scope: "unknown".to_string(),
                retry_after_secs: 1,
            }
        } else if lower.contains("connection") || lower.contains("timeout") {
            KairosError::Transient(msg.to_string())
        } else if lower.contains("duplicate") {
            // Duplicate-on-save is treated as success by the caller;
            // surfacing it here is informational only.
            KairosError::Other(msg.to_string())
        } else if lower.contains("not found") {
            KairosError::Other(msg.to_string())
        } else {
            KairosError::Transient(msg.to_string())
        }
    }

    /// Whether this error should route straight to the DLQ without retry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            KairosError::Permanent(_) | KairosError::ValidationFailure(_) | KairosError::Merge(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_messages() {
        assert!(matches!(
            KairosError::classify_message("Rate limit exceeded for tenant"),
            KairosError::RateLimited { .. }
        ));
    }

    #[test]
    fn classifies_connection_and_timeout_as_transient() {
        assert!(matches!(
            KairosError::classify_message("connection reset by peer"),
            KairosError::Transient(_)
        ));
        assert!(matches!(
            KairosError::classify_message("request timeout after 30s"),
            KairosError::Transient(_)
        ));
    }

    #[test]
    fn unknown_messages_default_to_transient() {
        assert!(matches!(
            KairosError::classify_message("the sky fell"),
            KairosError::Transient(_)
        ));
    }

    #[test]
    fn permanent_variants_are_flagged() {
        assert!(KairosError::Permanent("bad schema".into()).is_permanent());
        assert!(KairosError::ValidationFailure("missing id".into()).is_permanent());
        assert!(!KairosError::Transient("timeout".into()).is_permanent());
    }
}
