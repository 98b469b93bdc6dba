//! External webhook subscribers and internal in-process handlers (§4.9).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::event::IngestEvent;

/// An external HTTP subscriber. `${VAR_NAME}` references in `url` and
/// header values are resolved from the environment at construction time.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub name: String,
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl WebhookTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self { name: name.into(), url: resolve_env_vars(&url.into())?, headers: HashMap::new() })
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self, NotifyError> {
        self.headers.insert(key.into(), resolve_env_vars(&value.into())?);
        Ok(self)
    }
}

/// Outcome of one external POST attempt, classifying whether a failure
/// is retriable (network error, 5xx) or terminal (4xx).
pub enum PostOutcome {
    Success,
    Retriable(String),
    Terminal(String),
}

pub async fn post_event(client: &reqwest::Client, target: &WebhookTarget, event: &IngestEvent, timeout_secs: u64) -> PostOutcome {
    let mut request = client
        .post(&target.url)
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .json(event);
    for (k, v) in &target.headers {
        request = request.header(k.as_str(), v.as_str());
    }

    match request.send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                PostOutcome::Success
            } else if status.is_server_error() {
                PostOutcome::Retriable(format!("{status}"))
            } else {
                PostOutcome::Terminal(format!("{status}"))
            }
        }
        Err(e) => PostOutcome::Retriable(e.to_string()),
    }
}

/// An in-process subscriber that never goes through the circuit breaker —
/// it always runs, even while external targets are skipped.
#[async_trait]
pub trait InternalHandler: Send + Sync {
    async fn handle(&self, event: &IngestEvent);
    fn name(&self) -> &str;
}

fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            let value = std::env::var(&var_name).unwrap_or_default();
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_target_resolves_env_var_in_url() {
        std::env::set_var("KAIROS_NOTIFY_TEST_HOST", "example.com");
        let target = WebhookTarget::new("t", "https://${KAIROS_NOTIFY_TEST_HOST}/hook").unwrap();
        assert_eq!(target.url, "https://example.com/hook");
        std::env::remove_var("KAIROS_NOTIFY_TEST_HOST");
    }
}
