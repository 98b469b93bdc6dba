//! Post-save integrity checks (§4.3.2).
//!
//! Each check returns an [`IntegrityResult`]; callers compose these into
//! a [`crate::orchestrator::ValidationReport`]. Checks operate on
//! already-fetched data (entities/edges/counts) rather than reaching
//! into the graph store themselves, keeping this crate store-agnostic.

use chrono::Utc;
use kairos_core::{Centrality, Edge, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IntegrityResult {
    pub passed: bool,
    pub severity: Severity,
    pub check_name: String,
    pub message: String,
    pub suggested_fix: Option<String>,
}

impl IntegrityResult {
    fn pass(check_name: &str) -> Self {
        Self {
            passed: true,
            severity: Severity::Info,
            check_name: check_name.to_string(),
            message: "ok".to_string(),
            suggested_fix: None,
        }
    }

    fn fail(check_name: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            severity,
            check_name: check_name.to_string(),
            message: message.into(),
            suggested_fix: None,
        }
    }

    fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

/// A row with the entity's `id` exists, and exactly one.
pub fn entity_exists(matching_rows: usize) -> IntegrityResult {
    match matching_rows {
        1 => IntegrityResult::pass("entity_exists"),
        0 => IntegrityResult::fail("entity_exists", Severity::Error, "no row found for entity id"),
        n => IntegrityResult::fail(
            "entity_exists",
            Severity::Error,
            format!("expected exactly one row, found {n}"),
        ),
    }
}

/// Source and target entities referenced by an edge both exist.
pub fn edge_node_references(source_exists: bool, target_exists: bool) -> IntegrityResult {
    if source_exists && target_exists {
        return IntegrityResult::pass("edge_node_references");
    }
    let missing = match (source_exists, target_exists) {
        (false, false) => "source and target",
        (false, true) => "source",
        _ => "target",
    };
    IntegrityResult::fail(
        "edge_node_references",
        Severity::Error,
        format!("edge references missing {missing} node"),
    )
    .with_fix("delete the dangling edge or recreate the missing endpoint")
}

/// `id` is unique globally.
pub fn id_uniqueness(matching_rows: usize) -> IntegrityResult {
    if matching_rows <= 1 {
        IntegrityResult::pass("id_uniqueness")
    } else {
        IntegrityResult::fail(
            "id_uniqueness",
            Severity::Error,
            format!("id appears {matching_rows} times"),
        )
    }
}

/// All centrality fields in `[0, 1]`, not NaN/Inf.
pub fn centrality_bounds(centrality: &Centrality) -> IntegrityResult {
    if centrality.in_bounds() {
        IntegrityResult::pass("centrality_bounds")
    } else {
        IntegrityResult::fail("centrality_bounds", Severity::Error, "centrality value out of [0,1] or non-finite")
            .with_fix("clamp centrality values via kairos_validation::centrality::clamp")
    }
}

/// Same as the pre-save required-field check, verified from the persisted row.
pub fn required_fields_entity(entity: &Entity) -> IntegrityResult {
    if entity.id.is_nil() {
        return IntegrityResult::fail("required_fields", Severity::Error, "entity id is nil");
    }
    if entity.name.trim().is_empty() {
        return IntegrityResult::fail("required_fields", Severity::Error, "entity name is empty");
    }
    if entity.tenant.trim().is_empty() {
        return IntegrityResult::fail("required_fields", Severity::Error, "entity tenant is empty");
    }
    IntegrityResult::pass("required_fields")
}

pub fn required_fields_edge(edge: &Edge) -> IntegrityResult {
    if edge.id.is_nil() || edge.source_id.is_nil() || edge.target_id.is_nil() {
        return IntegrityResult::fail("required_fields", Severity::Error, "edge has a nil id/source/target");
    }
    if edge.tenant.trim().is_empty() {
        return IntegrityResult::fail("required_fields", Severity::Error, "edge tenant is empty");
    }
    IntegrityResult::pass("required_fields")
}

/// If `name` is present, `name_embedding` should be too (warning severity).
pub fn embedding_consistency_entity(entity: &Entity) -> IntegrityResult {
    if !entity.name.trim().is_empty() && !entity.has_embedding() {
        return IntegrityResult::fail(
            "embedding_consistency",
            Severity::Warning,
            "entity has a name but no name_embedding",
        );
    }
    IntegrityResult::pass("embedding_consistency")
}

/// If `fact` is present, `fact_embedding` should be too (warning severity).
pub fn embedding_consistency_edge(edge: &Edge) -> IntegrityResult {
    let has_fact = edge.fact.as_deref().is_some_and(|f| !f.trim().is_empty());
    let has_embedding = edge.fact_embedding.as_ref().is_some_and(|e| !e.is_empty());
    if has_fact && !has_embedding {
        return IntegrityResult::fail(
            "embedding_consistency",
            Severity::Warning,
            "edge has a fact but no fact_embedding",
        );
    }
    IntegrityResult::pass("embedding_consistency")
}

/// No future timestamps; `created_at <= updated_at` (warning severity).
pub fn temporal_consistency_entity(entity: &Entity) -> IntegrityResult {
    let now = Utc::now();
    if entity.created_at > now || entity.updated_at > now {
        return IntegrityResult::fail("temporal_consistency", Severity::Warning, "entity has a future timestamp");
    }
    if entity.created_at > entity.updated_at {
        return IntegrityResult::fail(
            "temporal_consistency",
            Severity::Warning,
            "entity created_at is after updated_at",
        );
    }
    IntegrityResult::pass("temporal_consistency")
}

/// `valid_at < invalid_at` when both present (warning severity).
pub fn temporal_consistency_edge(edge: &Edge) -> IntegrityResult {
    let now = Utc::now();
    if edge.created_at > now || edge.valid_at > now {
        return IntegrityResult::fail("temporal_consistency", Severity::Warning, "edge has a future timestamp");
    }
    if let Some(invalid_at) = edge.invalid_at {
        if edge.valid_at >= invalid_at {
            return IntegrityResult::fail(
                "temporal_consistency",
                Severity::Warning,
                "edge valid_at is not before invalid_at",
            );
        }
    }
    IntegrityResult::pass("temporal_consistency")
}

/// No duplicate ids within a batch; when an expected tenant is supplied,
/// every member must match it (warning severity).
pub fn batch_consistency(entities: &[Entity], expected_tenant: Option<&str>) -> IntegrityResult {
    let mut seen = std::collections::HashSet::new();
    for entity in entities {
        if !seen.insert(entity.id) {
            return IntegrityResult::fail(
                "batch_consistency",
                Severity::Warning,
                format!("duplicate id {} within batch", entity.id),
            );
        }
    }
    if let Some(tenant) = expected_tenant {
        if entities.iter().any(|e| e.tenant != tenant) {
            return IntegrityResult::fail(
                "batch_consistency",
                Severity::Warning,
                format!("batch contains entities outside expected tenant {tenant}"),
            );
        }
    }
    IntegrityResult::pass("batch_consistency")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::Entity;
    use uuid::Uuid;

    #[test]
    fn entity_exists_variants() {
        assert!(entity_exists(1).passed);
        assert!(!entity_exists(0).passed);
        assert!(!entity_exists(2).passed);
    }

    #[test]
    fn edge_node_references_reports_missing_side() {
        let result = edge_node_references(true, false);
        assert!(!result.passed);
        assert!(result.message.contains("target"));
    }

    #[test]
    fn centrality_bounds_detects_nan() {
        let c = Centrality { degree: f64::NAN, ..Default::default() };
        assert!(!centrality_bounds(&c).passed);
    }

    #[test]
    fn temporal_consistency_flags_future_timestamp() {
        let mut entity = Entity::new(Uuid::new_v4(), "x".to_string(), "t".to_string());
        entity.created_at = Utc::now() + chrono::Duration::days(1);
        assert!(!temporal_consistency_entity(&entity).passed);
    }

    #[test]
    fn batch_consistency_detects_tenant_mismatch() {
        let a = Entity::new(Uuid::new_v4(), "a".to_string(), "t1".to_string());
        let b = Entity::new(Uuid::new_v4(), "b".to_string(), "t2".to_string());
        let result = batch_consistency(&[a, b], Some("t1"));
        assert!(!result.passed);
    }
}
