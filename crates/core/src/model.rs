use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type EntityId = Uuid;
pub type EdgeId = Uuid;
pub type EpisodeId = Uuid;
pub type TaskId = Uuid;

/// Centrality scores, always clamped to `[0, 1]` and never NaN (§3, §8.4).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centrality {
    pub degree: f64,
    pub pagerank: f64,
    pub betweenness: f64,
    pub eigenvector: f64,
    pub importance: f64,
}

impl Default for Centrality {
    fn default() -> Self {
        Self {
            degree: 0.0,
            pagerank: 0.0,
            betweenness: 0.0,
            eigenvector: 0.0,
            importance: 0.0,
        }
    }
}

impl Centrality {
    /// Clamp every field to `[0, 1]`, replacing NaN/Inf with 0.
    pub fn clamped(&self) -> Self {
        let fix = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            degree: fix(self.degree),
            pagerank: fix(self.pagerank),
            betweenness: fix(self.betweenness),
            eigenvector: fix(self.eigenvector),
            importance: fix(self.importance),
        }
    }

    pub fn in_bounds(&self) -> bool {
        let ok = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        ok(self.degree)
            && ok(self.pagerank)
            && ok(self.betweenness)
            && ok(self.eigenvector)
            && ok(self.importance)
    }
}

/// A node in the temporal knowledge graph (§3 "Entity").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub tenant: String,
    /// Always includes `"Entity"`.
    pub labels: Vec<String>,
    pub summary: Option<String>,
    pub name_embedding: Option<Vec<f32>>,
    pub attributes: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub centrality: Centrality,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>, tenant: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            tenant: tenant.into(),
            labels: vec!["Entity".to_string()],
            summary: None,
            name_embedding: None,
            attributes: HashMap::new(),
            created_at: now,
            updated_at: now,
            centrality: Centrality::default(),
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.name_embedding.as_ref().is_some_and(|v| !v.is_empty())
    }

    pub fn has_summary(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// `id`, `name`, `tenant` non-empty; `created_at <= updated_at` (§3 invariants).
    pub fn validate_invariants(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("entity name must not be empty".to_string());
        }
        if self.tenant.trim().is_empty() {
            return Err("entity tenant must not be empty".to_string());
        }
        if self.created_at > self.updated_at {
            return Err("created_at must be <= updated_at".to_string());
        }
        if !self.centrality.in_bounds() {
            return Err("centrality scores out of [0,1] bounds or NaN".to_string());
        }
        Ok(())
    }
}

/// A directed relationship between two entities (§3 "Edge").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub tenant: String,
    /// Relation label, normalized to upper snake case. Default `RELATES_TO`.
    pub name: String,
    pub fact: Option<String>,
    pub fact_embedding: Option<Vec<f32>>,
    pub episodes: Vec<EpisodeId>,
    pub created_at: DateTime<Utc>,
    pub valid_at: DateTime<Utc>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub attributes: HashMap<String, Value>,
}

pub const DEFAULT_EDGE_NAME: &str = "RELATES_TO";

impl Edge {
    pub fn new(
        id: EdgeId,
        source_id: EntityId,
        target_id: EntityId,
        tenant: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_id,
            target_id,
            tenant: tenant.into(),
            name: normalize_edge_name(name.as_deref()),
            fact: None,
            fact_embedding: None,
            episodes: Vec::new(),
            created_at: now,
            valid_at: now,
            invalid_at: None,
            attributes: HashMap::new(),
        }
    }

    pub fn validate_invariants(&self) -> Result<(), String> {
        if self.tenant.trim().is_empty() {
            return Err("edge tenant must not be empty".to_string());
        }
        if let Some(invalid_at) = self.invalid_at {
            if !(self.valid_at < invalid_at) {
                return Err("valid_at must be < invalid_at when both present".to_string());
            }
        }
        Ok(())
    }
}

/// Normalize a relation label to upper snake case, defaulting to `RELATES_TO`.
pub fn normalize_edge_name(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|s| !s.is_empty()) {
        None => DEFAULT_EDGE_NAME.to_string(),
        Some(n) => n
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect(),
    }
}

/// Source kind for an ingested episode (§3 "Episode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeSource {
    Message,
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub tenant: String,
    pub name: String,
    pub content: String,
    pub source: EpisodeSource,
    pub source_description: String,
    pub valid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The closed set of task kinds the worker dispatches on (§3, §4.7.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Episode,
    Entity,
    Batch,
    Relationship,
    Deduplication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

/// A unit of ingestion work, persisted inside a queue message envelope (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub payload: HashMap<String, Value>,
    pub tenant: Option<String>,
    pub priority: TaskPriority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub visibility_timeout_secs: u64,
    pub metadata: HashMap<String, Value>,
}

impl IngestionTask {
    pub fn new(kind: TaskKind, payload: HashMap<String, Value>, tenant: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            tenant,
            priority: TaskPriority::Normal,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            visibility_timeout_secs: 300,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_invariants_reject_blank_name() {
        let mut e = Entity::new(Uuid::new_v4(), "Claude", "T");
        e.name = "  ".to_string();
        assert!(e.validate_invariants().is_err());
    }

    #[test]
    fn entity_invariants_reject_updated_before_created() {
        let mut e = Entity::new(Uuid::new_v4(), "Claude", "T");
        e.updated_at = e.created_at - chrono::Duration::seconds(1);
        assert!(e.validate_invariants().is_err());
    }

    #[test]
    fn centrality_clamps_nan_and_out_of_range() {
        let c = Centrality {
            degree: f64::NAN,
            pagerank: 2.0,
            betweenness: -1.0,
            eigenvector: 0.5,
            importance: f64::INFINITY,
        };
        let clamped = c.clamped();
        assert!(clamped.in_bounds());
        assert_eq!(clamped.degree, 0.0);
        assert_eq!(clamped.pagerank, 1.0);
        assert_eq!(clamped.betweenness, 0.0);
        assert_eq!(clamped.importance, 0.0);
    }

    #[test]
    fn edge_name_defaults_and_normalizes() {
        assert_eq!(normalize_edge_name(None), "RELATES_TO");
        assert_eq!(normalize_edge_name(Some("")), "RELATES_TO");
        assert_eq!(normalize_edge_name(Some("knows")), "KNOWS");
        assert_eq!(normalize_edge_name(Some("works at")), "WORKS_AT");
    }

    #[test]
    fn edge_invariants_require_valid_before_invalid() {
        let mut e = Edge::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "T", None);
        e.invalid_at = Some(e.valid_at);
        assert!(e.validate_invariants().is_err());
        e.invalid_at = Some(e.valid_at + chrono::Duration::seconds(1));
        assert!(e.validate_invariants().is_ok());
    }
}
