//! Typed queue client over the `queued`-style HTTP+msgpack broker (C1, §4.1).
//!
//! Idempotent queue creation, batched push, visibility-timeout poll with
//! client-side priority sort, delete/update by `(id, poll_tag)`, and a
//! `/metrics`+`/queues` pair for operational stats.

use async_trait::async_trait;
use kairos_core::IngestionTask;

use crate::envelope::{decode_message, encode_task, sort_by_priority, PolledMessage, RawMessage};
use crate::error::QueueError;

/// Outcome of [`QueueClient::ack`] — `stale` when the `poll_tag` no longer
/// matches (another consumer re-polled the message) per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Ok,
    Stale,
}

/// Outcome of [`QueueClient::extend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendOutcome {
    Extended { new_poll_tag: String },
    Stale,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct QueueStats {
    pub depth: u64,
    pub in_flight: u64,
    pub oldest_age_secs: Option<u64>,
}

/// A typed façade over a durable queue service providing at-least-once
/// delivery via visibility timeout (§4.1).
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Batched enqueue; ensures the queue exists (idempotent create) before
    /// pushing. Returns broker-assigned ids in the same order as `tasks`.
    async fn enqueue(
        &self,
        queue: &str,
        tasks: &[IngestionTask],
        visibility_timeout_secs: u64,
    ) -> Result<Vec<i64>, QueueError>;

    /// Returns up to `max_count` currently-visible messages, hidden for
    /// `visibility_timeout_secs`. Sorted in descending priority order
    /// before being handed back (the broker itself has no native
    /// priority). An empty result is normal and non-erroneous.
    async fn poll(
        &self,
        queue: &str,
        max_count: u32,
        visibility_timeout_secs: u64,
    ) -> Result<Vec<PolledMessage>, QueueError>;

    async fn ack(&self, queue: &str, message_id: i64, poll_tag: &str) -> Result<AckOutcome, QueueError>;

    /// Postpones redelivery without re-enqueuing. Callers must use the
    /// returned `new_poll_tag` for subsequent operations on this message.
    async fn extend(
        &self,
        queue: &str,
        message_id: i64,
        poll_tag: &str,
        new_timeout_secs: u64,
    ) -> Result<ExtendOutcome, QueueError>;

    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError>;

    async fn list_queues(&self) -> Result<Vec<String>, QueueError>;

    /// Reads a DLQ message, resets `retry_count` to zero, and pushes it
    /// back onto `target_queue` — the operation behind a dashboard's
    /// "reprocess" button (§11 supplemental).
    async fn requeue_from_dlq(
        &self,
        dlq: &str,
        target_queue: &str,
        message_id: i64,
        poll_tag: &str,
    ) -> Result<i64, QueueError> {
        let mut polled = self.poll(dlq, 1, 30).await?;
        let msg = polled
            .pop()
            .filter(|m| m.message_id == message_id)
            .ok_or_else(|| QueueError::NotFound(format!("dlq message {message_id}")))?;
        let _ = poll_tag; // broker re-issues its own tag on poll; caller's is advisory here.
        let mut task = msg.task;
        task.retry_count = 0;
        let ids = self.enqueue(target_queue, &[task], 300).await?;
        self.ack(dlq, msg.message_id, &msg.poll_tag).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| QueueError::Parse("broker returned no id for requeue".into()))
    }
}

/// HTTP+msgpack broker client (`PUT /queue/{q}`, `POST /queue/{q}/messages/
/// {push,poll,delete,update}`, `GET /metrics`, `GET /queues` — §6).
pub struct HttpBrokerClient {
    base_url: String,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl HttpBrokerClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            timeout_secs,
        }
    }

    async fn ensure_queue(&self, queue: &str) -> Result<(), QueueError> {
        let resp = self
            .http
            .put(format!("{}/queue/{queue}", self.base_url))
            .header("Content-Type", "application/msgpack")
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .body(rmp_serde::to_vec_named(&serde_json::json!({})).unwrap_or_default())
            .send()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        // 200 created, 409 already exists — both are success per §4.1's
        // "idempotent create" requirement.
        match resp.status().as_u16() {
            200 | 409 => Ok(()),
            status => Err(QueueError::Provider {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[derive(serde::Deserialize)]
struct PushResponse {
    ids: Vec<i64>,
}

#[derive(serde::Deserialize)]
struct PollResponseMessage {
    id: i64,
    contents: Vec<u8>,
    poll_tag: String,
    poll_count: u32,
    created: chrono::DateTime<chrono::Utc>,
}

#[derive(serde::Deserialize)]
struct PollResponse {
    #[serde(default)]
    messages: Vec<PollResponseMessage>,
}

#[derive(serde::Deserialize)]
struct UpdateResponse {
    new_poll_tag: Option<String>,
}

#[async_trait]
impl QueueClient for HttpBrokerClient {
    async fn enqueue(
        &self,
        queue: &str,
        tasks: &[IngestionTask],
        visibility_timeout_secs: u64,
    ) -> Result<Vec<i64>, QueueError> {
        self.ensure_queue(queue).await?;

        let messages: Vec<_> = tasks
            .iter()
            .map(|t| {
                let contents = encode_task(t)?;
                Ok(serde_json::json!({
                    "contents": contents,
                    "visibility_timeout_secs": visibility_timeout_secs,
                }))
            })
            .collect::<Result<_, QueueError>>()?;

        let body = rmp_serde::to_vec_named(&serde_json::json!({ "messages": messages }))
            .map_err(|e| QueueError::Parse(e.to_string()))?;

        let resp = self
            .http
            .post(format!("{}/queue/{queue}/messages/push", self.base_url))
            .header("Content-Type", "application/msgpack")
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .body(body)
            .send()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(QueueError::Provider {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| QueueError::Connection(e.to_string()))?;
        let parsed: PushResponse =
            rmp_serde::from_slice(&bytes).map_err(|e| QueueError::Parse(e.to_string()))?;
        tracing::info!(queue, count = tasks.len(), ids = ?parsed.ids, "enqueued tasks");
        Ok(parsed.ids)
    }

    async fn poll(
        &self,
        queue: &str,
        max_count: u32,
        visibility_timeout_secs: u64,
    ) -> Result<Vec<PolledMessage>, QueueError> {
        self.ensure_queue(queue).await?;

        let body = rmp_serde::to_vec_named(&serde_json::json!({
            "count": max_count,
            "visibility_timeout_secs": visibility_timeout_secs,
        }))
        .map_err(|e| QueueError::Parse(e.to_string()))?;

        let resp = self
            .http
            .post(format!("{}/queue/{queue}/messages/poll", self.base_url))
            .header("Content-Type", "application/msgpack")
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .body(body)
            .send()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        if resp.status().as_u16() == 204 {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(QueueError::Provider {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| QueueError::Connection(e.to_string()))?;
        let parsed: PollResponse =
            rmp_serde::from_slice(&bytes).map_err(|e| QueueError::Parse(e.to_string()))?;

        let mut decoded = Vec::with_capacity(parsed.messages.len());
        for msg in parsed.messages {
            let raw = RawMessage {
                id: msg.id,
                poll_tag: msg.poll_tag,
                poll_count: msg.poll_count,
                created: msg.created,
                contents: msg.contents,
            };
            match decode_message(raw) {
                Ok(polled) => decoded.push(polled),
                Err(e) => tracing::warn!(error = %e, "failed to decode polled message, skipping"),
            }
        }
        tracing::debug!(queue, count = decoded.len(), "polled tasks");
        Ok(sort_by_priority(decoded))
    }

    async fn ack(&self, queue: &str, message_id: i64, poll_tag: &str) -> Result<AckOutcome, QueueError> {
        let body = rmp_serde::to_vec_named(&serde_json::json!({
            "messages": [{ "id": message_id, "poll_tag": poll_tag }],
        }))
        .map_err(|e| QueueError::Parse(e.to_string()))?;

        let resp = self
            .http
            .post(format!("{}/queue/{queue}/messages/delete", self.base_url))
            .header("Content-Type", "application/msgpack")
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .body(body)
            .send()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        match resp.status().as_u16() {
            200 => Ok(AckOutcome::Ok),
            409 | 404 => Ok(AckOutcome::Stale),
            status => Err(QueueError::Provider {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn extend(
        &self,
        queue: &str,
        message_id: i64,
        poll_tag: &str,
        new_timeout_secs: u64,
    ) -> Result<ExtendOutcome, QueueError> {
        let body = rmp_serde::to_vec_named(&serde_json::json!({
            "id": message_id,
            "poll_tag": poll_tag,
            "visibility_timeout_secs": new_timeout_secs,
        }))
        .map_err(|e| QueueError::Parse(e.to_string()))?;

        let resp = self
            .http
            .post(format!("{}/queue/{queue}/messages/update", self.base_url))
            .header("Content-Type", "application/msgpack")
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .body(body)
            .send()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        match resp.status().as_u16() {
            200 => {
                let bytes = resp.bytes().await.map_err(|e| QueueError::Connection(e.to_string()))?;
                let parsed: UpdateResponse =
                    rmp_serde::from_slice(&bytes).map_err(|e| QueueError::Parse(e.to_string()))?;
                match parsed.new_poll_tag {
                    Some(new_poll_tag) => Ok(ExtendOutcome::Extended { new_poll_tag }),
                    None => Ok(ExtendOutcome::Stale),
                }
            }
            409 | 404 => Ok(ExtendOutcome::Stale),
            status => Err(QueueError::Provider {
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn stats(&self, _queue: &str) -> Result<QueueStats, QueueError> {
        let resp = self
            .http
            .get(format!("{}/metrics", self.base_url))
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(QueueError::Provider {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| QueueError::Connection(e.to_string()))?;
        rmp_serde::from_slice(&bytes).map_err(|e| QueueError::Parse(e.to_string()))
    }

    async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        #[derive(serde::Deserialize)]
        struct QueueEntry {
            name: String,
        }
        #[derive(serde::Deserialize)]
        struct QueuesResponse {
            #[serde(default)]
            queues: Vec<QueueEntry>,
        }

        let resp = self
            .http
            .get(format!("{}/queues", self.base_url))
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(QueueError::Provider {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| QueueError::Connection(e.to_string()))?;
        let parsed: QueuesResponse =
            rmp_serde::from_slice(&bytes).map_err(|e| QueueError::Parse(e.to_string()))?;
        Ok(parsed.queues.into_iter().map(|q| q.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryBrokerClient;
    use kairos_core::{IngestionTask, TaskKind, TaskPriority};
    use std::collections::HashMap;

    fn task(priority: TaskPriority) -> IngestionTask {
        IngestionTask::new(TaskKind::Episode, HashMap::new(), Some("T".to_string()))
            .with_priority(priority)
    }

    #[tokio::test]
    async fn enqueue_then_poll_roundtrips() {
        let client = InMemoryBrokerClient::default();
        let ids = client.enqueue("ingestion", &[task(TaskPriority::Normal)], 300).await.unwrap();
        assert_eq!(ids.len(), 1);
        let polled = client.poll("ingestion", 10, 300).await.unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].message_id, ids[0]);
    }

    #[tokio::test]
    async fn empty_poll_is_not_an_error() {
        let client = InMemoryBrokerClient::default();
        let polled = client.poll("ingestion", 10, 300).await.unwrap();
        assert!(polled.is_empty());
    }

    #[tokio::test]
    async fn poll_sorts_by_descending_priority() {
        let client = InMemoryBrokerClient::default();
        client
            .enqueue(
                "ingestion",
                &[task(TaskPriority::Low), task(TaskPriority::Critical), task(TaskPriority::Normal)],
                300,
            )
            .await
            .unwrap();
        let polled = client.poll("ingestion", 10, 300).await.unwrap();
        assert_eq!(polled[0].task.priority, TaskPriority::Critical);
        assert_eq!(polled[1].task.priority, TaskPriority::Normal);
        assert_eq!(polled[2].task.priority, TaskPriority::Low);
    }

    #[tokio::test]
    async fn stale_ack_does_not_remove_message() {
        let client = InMemoryBrokerClient::default();
        let ids = client.enqueue("ingestion", &[task(TaskPriority::Normal)], 300).await.unwrap();
        let outcome = client.ack("ingestion", ids[0], "wrong-tag").await.unwrap();
        assert_eq!(outcome, AckOutcome::Stale);
    }

    #[tokio::test]
    async fn ack_on_already_deleted_message_is_idempotent_success() {
        let client = InMemoryBrokerClient::default();
        let ids = client.enqueue("ingestion", &[task(TaskPriority::Normal)], 300).await.unwrap();
        let polled = client.poll("ingestion", 10, 300).await.unwrap();
        assert_eq!(client.ack("ingestion", polled[0].message_id, &polled[0].poll_tag).await.unwrap(), AckOutcome::Ok);
        assert_eq!(client.ack("ingestion", ids[0], &polled[0].poll_tag).await.unwrap(), AckOutcome::Ok);
    }

    #[tokio::test]
    async fn extend_with_stale_tag_fails_and_message_is_not_ackable_by_stale_caller() {
        let client = InMemoryBrokerClient::default();
        client.enqueue("ingestion", &[task(TaskPriority::Normal)], 300).await.unwrap();
        let polled = client.poll("ingestion", 10, 300).await.unwrap();
        let stale_tag = polled[0].poll_tag.clone();
        let extended = client.extend("ingestion", polled[0].message_id, &stale_tag, 60).await.unwrap();
        assert!(matches!(extended, ExtendOutcome::Extended { .. }));
        // The original tag is now stale.
        let result = client.extend("ingestion", polled[0].message_id, &stale_tag, 60).await.unwrap();
        assert_eq!(result, ExtendOutcome::Stale);
    }

    #[tokio::test]
    async fn requeue_from_dlq_resets_retry_count() {
        let client = InMemoryBrokerClient::default();
        let mut t = task(TaskPriority::Normal);
        t.retry_count = 3;
        client.enqueue("dlq", &[t], 300).await.unwrap();
        let polled = client.poll("dlq", 10, 300).await.unwrap();
        let new_id = client
            .requeue_from_dlq("dlq", "ingestion", polled[0].message_id, &polled[0].poll_tag)
            .await
            .unwrap();
        let repolled = client.poll("ingestion", 10, 300).await.unwrap();
        assert_eq!(repolled[0].message_id, new_id);
        assert_eq!(repolled[0].task.retry_count, 0);
    }
}
