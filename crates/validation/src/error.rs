#[derive(Debug, thiserror::Error)]
pub enum ValidationCrateError {
    #[error("validation exceeded max wall clock of {limit_ms}ms")]
    WallClockExceeded { limit_ms: u64 },

    #[error("unknown hook kind: {0}")]
    UnknownHookKind(String),
}
