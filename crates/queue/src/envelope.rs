//! Wire envelope for queue messages (§4.1, §6).
//!
//! Each stored message is `{ priority: int, task: <serialized IngestionTask> }`
//! so the broker treats contents opaquely while the client sorts by priority
//! after poll — the broker itself has no native priority support.

use chrono::{DateTime, Utc};
use kairos_core::IngestionTask;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub priority: i32,
    pub task: IngestionTask,
}

impl TaskEnvelope {
    pub fn new(task: IngestionTask) -> Self {
        Self {
            priority: task.priority as i32,
            task,
        }
    }
}

/// A message as returned by a raw broker poll, before priority sorting.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: i64,
    pub poll_tag: String,
    pub poll_count: u32,
    pub created: DateTime<Utc>,
    pub contents: Vec<u8>,
}

/// A message decoded and ready for dispatch: `(message_id, task, poll_tag)` (§4.1).
#[derive(Debug, Clone)]
pub struct PolledMessage {
    pub message_id: i64,
    pub task: IngestionTask,
    pub poll_tag: String,
}

/// Decode a raw broker message's msgpack `contents` into a `PolledMessage`.
pub fn decode_message(raw: RawMessage) -> Result<PolledMessage, crate::error::QueueError> {
    let envelope: TaskEnvelope = rmp_serde::from_slice(&raw.contents)
        .map_err(|e| crate::error::QueueError::Parse(format!("message {}: {}", raw.id, e)))?;
    Ok(PolledMessage {
        message_id: raw.id,
        task: envelope.task,
        poll_tag: raw.poll_tag,
    })
}

/// Encode a task into the msgpack envelope bytes the broker stores opaquely.
pub fn encode_task(task: &IngestionTask) -> Result<Vec<u8>, crate::error::QueueError> {
    let envelope = TaskEnvelope::new(task.clone());
    rmp_serde::to_vec_named(&envelope)
        .map_err(|e| crate::error::QueueError::Parse(format!("encode task {}: {}", task.id, e)))
}

/// Sort polled messages in descending priority order (§4.1: the broker has
/// no native priority, so the client sorts after fetching).
pub fn sort_by_priority(mut messages: Vec<PolledMessage>) -> Vec<PolledMessage> {
    messages.sort_by(|a, b| (b.task.priority as i32).cmp(&(a.task.priority as i32)));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::{IngestionTask, TaskKind, TaskPriority};
    use std::collections::HashMap;

    fn task(priority: TaskPriority) -> IngestionTask {
        IngestionTask::new(TaskKind::Episode, HashMap::new(), Some("T".to_string()))
            .with_priority(priority)
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = task(TaskPriority::High);
        let bytes = encode_task(&original).unwrap();
        let raw = RawMessage {
            id: 1,
            poll_tag: "tag-1".to_string(),
            poll_count: 1,
            created: Utc::now(),
            contents: bytes,
        };
        let decoded = decode_message(raw).unwrap();
        assert_eq!(decoded.task.id, original.id);
        assert_eq!(decoded.task.priority, TaskPriority::High);
    }

    #[test]
    fn sort_by_priority_descending() {
        let messages = vec![
            PolledMessage { message_id: 1, task: task(TaskPriority::Low), poll_tag: "a".into() },
            PolledMessage { message_id: 2, task: task(TaskPriority::Critical), poll_tag: "b".into() },
            PolledMessage { message_id: 3, task: task(TaskPriority::Normal), poll_tag: "c".into() },
        ];
        let sorted = sort_by_priority(messages);
        assert_eq!(sorted[0].message_id, 2);
        assert_eq!(sorted[1].message_id, 3);
        assert_eq!(sorted[2].message_id, 1);
    }
}
