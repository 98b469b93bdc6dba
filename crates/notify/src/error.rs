#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("queue full, event dropped")]
    QueueFull,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned terminal status {status}")]
    Terminal { status: u16 },

    #[error("circuit open for target {0}")]
    CircuitOpen(String),
}
