//! Events emitted after committed ingestion state changes (§4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A post-ingest event observed by the dispatcher: entity created,
/// entities merged, episode ingested, etc. `kind` is an open string so
/// callers can introduce new event kinds without touching this crate;
/// `payload` carries the kind-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    pub id: Uuid,
    pub kind: String,
    pub tenant: Option<String>,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl IngestEvent {
    pub fn new(kind: impl Into<String>, tenant: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            tenant,
            payload,
            occurred_at: Utc::now(),
        }
    }
}
