//! Merge policy (§4.3.5): primary-selection strategy, completeness/
//! centrality scoring, and per-field conflict resolution.
//!
//! This is distinct from `kairos-dedup::primary::select_primary`, which
//! picks the canonical member *during duplicate detection*. This module
//! picks (and, for `aggregate_all`, builds) the primary entity *at merge
//! time*, honoring the operator-configurable `MERGE_STRATEGY` — the
//! scoring here is richer than the detection-time heuristic: completeness
//! bonuses and weighted centrality are both folded in.

use kairos_core::config::MergeConfig;
use kairos_core::Entity;

/// Completeness score: presence of summary/embedding plus length/count
/// bonuses for labels and attributes.
pub fn completeness_score(entity: &Entity) -> f64 {
    let mut score = 0.0;
    if entity.has_summary() {
        score += 10.0;
        score += (entity.summary.as_deref().unwrap_or("").len() as f64 / 50.0).min(5.0);
    }
    if entity.has_embedding() {
        score += 10.0;
    }
    score += (entity.labels.len() as f64).min(5.0);
    score += (entity.attributes.len() as f64 / 2.0).min(5.0);
    score
}

/// Weighted centrality score using the configured per-metric weights.
pub fn centrality_score(entity: &Entity, config: &MergeConfig) -> f64 {
    let c = entity.centrality.clamped();
    c.degree * config.centrality_weight_degree
        + c.pagerank * config.centrality_weight_pagerank
        + c.betweenness * config.centrality_weight_betweenness
        + c.eigenvector * config.centrality_weight_eigenvector
}

/// Select the primary among `members` per the configured strategy.
///
/// `aggregate_all` has no single natural "oldest/newest/most complete"
/// winner, so it falls back to the most-complete member as the write
/// target; the aggregation itself happens in field merge, not here.
pub fn select_primary<'a>(members: &'a [Entity], config: &MergeConfig) -> Option<&'a Entity> {
    match config.strategy.as_str() {
        "preserve_oldest" => members.iter().min_by_key(|e| e.created_at),
        "preserve_newest" => members.iter().max_by_key(|e| e.created_at),
        "preserve_highest_centrality" => members.iter().max_by(|a, b| {
            centrality_score(a, config)
                .partial_cmp(&centrality_score(b, config))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        _ => members.iter().max_by(|a, b| {
            completeness_score(a)
                .partial_cmp(&completeness_score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
    }
}

/// Field merge rule (§4.3.5, §6 default table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    Overwrite,
    Merge,
    Preserve,
    Skip,
}

/// Conflict resolution applied when `FieldRule::Merge` needs to combine
/// two present values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    FirstWins,
    LastWins,
    LongestWins,
    Max,
    Min,
    Average,
    Concatenate,
    ListUnion,
}

/// Merge two string fields under a conflict resolution. `existing` is the
/// canonical's current value, `incoming` the duplicate's.
pub fn merge_string(existing: &str, incoming: &str, resolution: ConflictResolution) -> String {
    match resolution {
        ConflictResolution::FirstWins => existing.to_string(),
        ConflictResolution::LastWins => incoming.to_string(),
        ConflictResolution::LongestWins => {
            if incoming.len() > existing.len() {
                incoming.to_string()
            } else {
                existing.to_string()
            }
        }
        ConflictResolution::Concatenate => {
            if existing.is_empty() {
                incoming.to_string()
            } else if incoming.is_empty() || incoming == existing {
                existing.to_string()
            } else {
                format!("{existing} {incoming}")
            }
        }
        _ => existing.to_string(),
    }
}

/// Union two label/string-list fields, preserving first-seen order.
pub fn list_union(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut out = existing.to_vec();
    for item in incoming {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

pub fn numeric_resolve(existing: f64, incoming: f64, resolution: ConflictResolution) -> f64 {
    match resolution {
        ConflictResolution::Max => existing.max(incoming),
        ConflictResolution::Min => existing.min(incoming),
        ConflictResolution::Average => (existing + incoming) / 2.0,
        ConflictResolution::FirstWins => existing,
        ConflictResolution::LastWins => incoming,
        _ => existing.max(incoming),
    }
}

/// Field merge: `name` merges via longest_wins; `summary` via
/// longest_wins; `labels`/`name_embedding` via union/longest; `tenant`
/// preserves first; `created_at` preserves min; `updated_at` overwrites
/// to max; each centrality field merges via max (§6 default table).
pub fn merge_fields(canonical: &mut Entity, duplicate: &Entity) {
    canonical.name = merge_string(&canonical.name, &duplicate.name, ConflictResolution::LongestWins);
    canonical.labels = list_union(&canonical.labels, &duplicate.labels);

    canonical.summary = match (&canonical.summary, &duplicate.summary) {
        (Some(a), Some(b)) => Some(merge_string(a, b, ConflictResolution::LongestWins)),
        (Some(a), None) => Some(a.clone()),
        (None, b) => b.clone(),
    };

    canonical.name_embedding = match (&canonical.name_embedding, &duplicate.name_embedding) {
        (Some(a), Some(b)) if b.len() > a.len() => Some(b.clone()),
        (Some(a), _) => Some(a.clone()),
        (None, b) => b.clone(),
    };

    canonical.created_at = canonical.created_at.min(duplicate.created_at);
    canonical.updated_at = canonical.updated_at.max(duplicate.updated_at);

    canonical.centrality.degree = canonical.centrality.degree.max(duplicate.centrality.degree);
    canonical.centrality.pagerank = canonical.centrality.pagerank.max(duplicate.centrality.pagerank);
    canonical.centrality.betweenness = canonical.centrality.betweenness.max(duplicate.centrality.betweenness);
    canonical.centrality.eigenvector = canonical.centrality.eigenvector.max(duplicate.centrality.eigenvector);
    canonical.centrality.importance = canonical.centrality.importance.max(duplicate.centrality.importance);
    canonical.centrality = canonical.centrality.clamped();

    for (k, v) in &duplicate.attributes {
        canonical.attributes.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn default_config() -> MergeConfig {
        MergeConfig {
            strategy: "preserve_most_complete".to_string(),
            default_conflict_resolution: "last_wins".to_string(),
            track_merge_history: true,
            max_history_entries: 10,
            allow_cross_tenant_merge: false,
            write_audit_edge: true,
            centrality_weight_degree: 0.25,
            centrality_weight_pagerank: 0.25,
            centrality_weight_betweenness: 0.25,
            centrality_weight_eigenvector: 0.25,
        }
    }

    #[test]
    fn preserve_oldest_selects_earliest_created() {
        let mut config = default_config();
        config.strategy = "preserve_oldest".to_string();
        let mut older = Entity::new(Uuid::new_v4(), "a", "t");
        older.created_at = Utc::now() - Duration::days(10);
        let newer = Entity::new(Uuid::new_v4(), "b", "t");
        let winner = select_primary(&[newer, older.clone()], &config).unwrap();
        assert_eq!(winner.id, older.id);
    }

    #[test]
    fn most_complete_prefers_summary_and_embedding() {
        let config = default_config();
        let bare = Entity::new(Uuid::new_v4(), "a", "t");
        let mut rich = Entity::new(Uuid::new_v4(), "b", "t");
        rich.summary = Some("a detailed summary of this entity".to_string());
        rich.name_embedding = Some(vec![0.1, 0.2]);
        let winner = select_primary(&[bare, rich.clone()], &config).unwrap();
        assert_eq!(winner.id, rich.id);
    }

    #[test]
    fn merge_fields_unions_labels_and_takes_longest_summary() {
        let mut canonical = Entity::new(Uuid::new_v4(), "Acme", "t");
        canonical.labels = vec!["Entity".to_string(), "Org".to_string()];
        canonical.summary = Some("short".to_string());
        let mut duplicate = Entity::new(Uuid::new_v4(), "Acme Inc", "t");
        duplicate.labels = vec!["Entity".to_string(), "Company".to_string()];
        duplicate.summary = Some("a much longer summary text".to_string());

        merge_fields(&mut canonical, &duplicate);

        assert!(canonical.labels.contains(&"Org".to_string()));
        assert!(canonical.labels.contains(&"Company".to_string()));
        assert_eq!(canonical.summary.as_deref(), Some("a much longer summary text"));
    }

    #[test]
    fn merge_fields_takes_max_centrality() {
        let mut canonical = Entity::new(Uuid::new_v4(), "A", "t");
        canonical.centrality.degree = 0.2;
        let mut duplicate = Entity::new(Uuid::new_v4(), "B", "t");
        duplicate.centrality.degree = 0.8;
        merge_fields(&mut canonical, &duplicate);
        assert_eq!(canonical.centrality.degree, 0.8);
    }

    #[test]
    fn merge_fields_preserves_earliest_created_at() {
        let mut canonical = Entity::new(Uuid::new_v4(), "A", "t");
        let mut duplicate = Entity::new(Uuid::new_v4(), "B", "t");
        duplicate.created_at = canonical.created_at - Duration::days(5);
        merge_fields(&mut canonical, &duplicate);
        assert_eq!(canonical.created_at, duplicate.created_at);
    }
}
