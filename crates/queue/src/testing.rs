//! In-memory broker double used by this crate's and downstream crates'
//! tests (§10 "never real network calls in tests"). Enabled under the
//! `test-util` feature so `kairos-worker`'s test suite can depend on it
//! instead of a real broker.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kairos_core::IngestionTask;

use crate::client::{AckOutcome, ExtendOutcome, QueueClient, QueueStats};
use crate::envelope::{sort_by_priority, PolledMessage};
use crate::error::QueueError;

#[derive(Default)]
pub struct InMemoryBrokerClient {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    next_id: i64,
    queues: HashMap<String, Vec<StoredMessage>>,
}

struct StoredMessage {
    id: i64,
    task: IngestionTask,
    poll_tag: String,
    visible: bool,
}

#[async_trait]
impl QueueClient for InMemoryBrokerClient {
    async fn enqueue(
        &self,
        queue: &str,
        tasks: &[IngestionTask],
        _visibility_timeout_secs: u64,
    ) -> Result<Vec<i64>, QueueError> {
        let mut state = self.inner.lock().unwrap();
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            state.next_id += 1;
            let id = state.next_id;
            state.queues.entry(queue.to_string()).or_default().push(StoredMessage {
                id,
                task: task.clone(),
                poll_tag: format!("tag-{id}-0"),
                visible: true,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn poll(
        &self,
        queue: &str,
        max_count: u32,
        _visibility_timeout_secs: u64,
    ) -> Result<Vec<PolledMessage>, QueueError> {
        let mut state = self.inner.lock().unwrap();
        let mut result = Vec::new();
        if let Some(msgs) = state.queues.get_mut(queue) {
            for msg in msgs.iter_mut() {
                if msg.visible && result.len() < max_count as usize {
                    msg.visible = false;
                    result.push(PolledMessage {
                        message_id: msg.id,
                        task: msg.task.clone(),
                        poll_tag: msg.poll_tag.clone(),
                    });
                }
            }
        }
        Ok(sort_by_priority(result))
    }

    async fn ack(&self, queue: &str, message_id: i64, poll_tag: &str) -> Result<AckOutcome, QueueError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(msgs) = state.queues.get_mut(queue) {
            if let Some(pos) = msgs.iter().position(|m| m.id == message_id) {
                if msgs[pos].poll_tag != poll_tag {
                    return Ok(AckOutcome::Stale);
                }
                msgs.remove(pos);
                return Ok(AckOutcome::Ok);
            }
        }
        // Already-deleted is idempotent-success (§4.1).
        Ok(AckOutcome::Ok)
    }

    async fn extend(
        &self,
        queue: &str,
        message_id: i64,
        poll_tag: &str,
        _new_timeout_secs: u64,
    ) -> Result<ExtendOutcome, QueueError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(msgs) = state.queues.get_mut(queue) {
            if let Some(msg) = msgs.iter_mut().find(|m| m.id == message_id) {
                if msg.poll_tag != poll_tag {
                    return Ok(ExtendOutcome::Stale);
                }
                let new_tag = format!("{}-x", msg.poll_tag);
                msg.poll_tag = new_tag.clone();
                msg.visible = true;
                return Ok(ExtendOutcome::Extended { new_poll_tag: new_tag });
            }
        }
        Ok(ExtendOutcome::Stale)
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let state = self.inner.lock().unwrap();
        let depth = state.queues.get(queue).map(|m| m.len()).unwrap_or(0) as u64;
        Ok(QueueStats { depth, in_flight: 0, oldest_age_secs: None })
    }

    async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        let state = self.inner.lock().unwrap();
        Ok(state.queues.keys().cloned().collect())
    }
}
