//! Atomic node-merge engine (C6, §4.6).
//!
//! Transfers edges from a duplicate entity to its canonical, resolving
//! conflicts via [`crate::edge_policy`], writes an optional audit edge,
//! finalizes the duplicate (delete or tombstone), and refreshes the
//! canonical's centrality. Every step is a single store call and is
//! individually idempotent — re-running `merge` for an already-merged
//! pair is a no-op (§8 "idempotence laws").

use std::sync::Arc;

use chrono::Utc;
use kairos_core::config::MergeConfig;
use kairos_core::{Edge, Entity, EntityId};
use kairos_graph::GraphDriver;

use crate::centrality::{local_fallback, CentralityClient};
use crate::error::MergeError;
use crate::policy::merge_fields;
use crate::edge_policy::merge_edge_properties;

pub const AUDIT_EDGE_NAME: &str = "IS_DUPLICATE_OF";

#[derive(Debug, Clone, Default)]
pub struct MergeStats {
    pub edges_transferred: usize,
    pub conflicts_resolved: usize,
    pub nodes_deleted: usize,
    pub centrality_recalculated: bool,
    pub centrality_method: Option<String>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

/// How the duplicate is finalized after transfer (§4.6 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    Delete,
    Tombstone,
}

pub struct MergeRequest {
    pub canonical_id: EntityId,
    pub duplicate_id: EntityId,
    pub finalization: Finalization,
    pub write_audit_edge: bool,
    pub allow_cross_tenant_merge: bool,
}

/// Merge `duplicate` into `canonical`. Idempotent: if `duplicate` no
/// longer exists (already merged away), returns a zero-effect
/// [`MergeStats`] rather than erroring.
pub async fn merge(
    store: &dyn GraphDriver,
    centrality_client: Option<&dyn CentralityClient>,
    config: &MergeConfig,
    request: MergeRequest,
) -> Result<MergeStats, MergeError> {
    let started = std::time::Instant::now();
    let mut stats = MergeStats::default();

    let Some(canonical) = store.get_entity(request.canonical_id).await? else {
        return Err(MergeError::CanonicalNotFound(request.canonical_id));
    };

    let Some(duplicate) = store.get_entity(request.duplicate_id).await? else {
        // Already merged away by a prior run — idempotent no-op.
        stats.duration_ms = started.elapsed().as_millis() as u64;
        return Ok(stats);
    };

    if canonical.tenant != duplicate.tenant && !request.allow_cross_tenant_merge {
        return Err(MergeError::CrossTenantNotAllowed {
            canonical_tenant: canonical.tenant.clone(),
            duplicate_tenant: duplicate.tenant.clone(),
        });
    }
    if canonical.tenant != duplicate.tenant {
        tracing::warn!(
            canonical = %canonical.id,
            duplicate = %duplicate.id,
            canonical_tenant = %canonical.tenant,
            duplicate_tenant = %duplicate.tenant,
            "cross-tenant merge"
        );
    }

    // Step 1: transfer incoming edges X -r-> duplicate.
    for edge in store.incoming_edges(duplicate.id).await? {
        if edge.source_id == canonical.id {
            store.delete_edge(edge.id).await?;
            continue;
        }
        transfer_edge(store, &mut stats, &edge, edge.source_id, canonical.id, &canonical.tenant).await?;
    }

    // Step 2: transfer outgoing edges duplicate -r-> Y, skipping self-refs.
    for edge in store.outgoing_edges(duplicate.id).await? {
        if edge.target_id == canonical.id {
            store.delete_edge(edge.id).await?;
            continue;
        }
        transfer_edge(store, &mut stats, &edge, canonical.id, edge.target_id, &canonical.tenant).await?;
    }

    // Step 3: cleanup residue — anything still incident to duplicate that
    // isn't the audit edge we're about to (re)write.
    for edge in store.outgoing_edges(duplicate.id).await? {
        if edge.name != AUDIT_EDGE_NAME {
            store.delete_edge(edge.id).await?;
        }
    }
    for edge in store.incoming_edges(duplicate.id).await? {
        if edge.name != AUDIT_EDGE_NAME {
            store.delete_edge(edge.id).await?;
        }
    }

    // Step 4: audit edge.
    if request.write_audit_edge {
        let audit_id = kairos_core::identity::edge_id(
            &duplicate.id.to_string(),
            &canonical.id.to_string(),
            Some(AUDIT_EDGE_NAME),
            &canonical.tenant,
        );
        let mut audit = Edge::new(audit_id, duplicate.id, canonical.id, canonical.tenant.clone(), Some(AUDIT_EDGE_NAME.to_string()));
        audit.attributes.insert("merged_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
        store.upsert_edge(audit).await?;
    }

    // Merge fields into the canonical before finalizing the duplicate.
    let mut merged_canonical = canonical.clone();
    merge_fields(&mut merged_canonical, &duplicate);
    if config.track_merge_history {
        append_merge_history(&mut merged_canonical, &duplicate, config);
    }
    merged_canonical.updated_at = Utc::now();
    store.upsert_entity(merged_canonical).await?;

    // Step 5: finalize duplicate.
    match request.finalization {
        Finalization::Delete => {
            store.delete_entity(duplicate.id).await?;
            stats.nodes_deleted = 1;
        }
        Finalization::Tombstone => {
            let mut tombstoned = duplicate.clone();
            tombstoned.attributes.insert("is_merged".to_string(), serde_json::json!(true));
            tombstoned.attributes.insert("merged_into".to_string(), serde_json::json!(canonical.id.to_string()));
            tombstoned.attributes.insert("merged_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
            tombstoned.updated_at = Utc::now();
            store.upsert_entity(tombstoned).await?;
        }
    }

    // Step 6: centrality refresh, preferred remote path then local fallback.
    refresh_centrality(store, centrality_client, &mut stats, canonical.id).await;

    stats.duration_ms = started.elapsed().as_millis() as u64;
    Ok(stats)
}

async fn transfer_edge(
    store: &dyn GraphDriver,
    stats: &mut MergeStats,
    edge: &Edge,
    new_source: EntityId,
    new_target: EntityId,
    canonical_tenant: &str,
) -> Result<(), MergeError> {
    let existing = find_edge_between(store, new_source, new_target, &edge.name).await?;

    match existing {
        Some(mut existing_edge) => {
            merge_edge_properties(&mut existing_edge, edge);
            store.upsert_edge(existing_edge).await?;
            stats.conflicts_resolved += 1;
        }
        None => {
            let mut copy = edge.clone();
            copy.source_id = new_source;
            copy.target_id = new_target;
            copy.tenant = canonical_tenant.to_string();
            store.upsert_edge(copy).await?;
        }
    }

    store.delete_edge(edge.id).await?;
    stats.edges_transferred += 1;
    Ok(())
}

async fn find_edge_between(
    store: &dyn GraphDriver,
    source: EntityId,
    target: EntityId,
    name: &str,
) -> Result<Option<Edge>, MergeError> {
    let outgoing = store.outgoing_edges(source).await?;
    Ok(outgoing.into_iter().find(|e| e.target_id == target && e.name == name))
}

fn append_merge_history(canonical: &mut Entity, duplicate: &Entity, config: &MergeConfig) {
    let mut history: Vec<serde_json::Value> = canonical
        .attributes
        .get("merge_history")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    history.push(serde_json::json!({
        "timestamp": Utc::now().to_rfc3339(),
        "merged_ids": [duplicate.id.to_string()],
        "strategy": config.strategy,
        "entity_count": 2,
    }));

    if history.len() > config.max_history_entries {
        let excess = history.len() - config.max_history_entries;
        history.drain(0..excess);
    }

    canonical.attributes.insert("merge_history".to_string(), serde_json::Value::Array(history));
}

async fn refresh_centrality(
    store: &dyn GraphDriver,
    centrality_client: Option<&dyn CentralityClient>,
    stats: &mut MergeStats,
    canonical_id: EntityId,
) {
    if let Some(client) = centrality_client {
        if client.update_node(canonical_id).await {
            stats.centrality_recalculated = true;
            stats.centrality_method = Some("remote".to_string());
            return;
        }
        stats.errors.push("centrality service call failed, falling back to local approximation".to_string());
    }

    let degree = match store.get_entity(canonical_id).await {
        Ok(Some(entity)) => {
            let out = store.outgoing_edges(entity.id).await.map(|v| v.len()).unwrap_or(0);
            let inc = store.incoming_edges(entity.id).await.map(|v| v.len()).unwrap_or(0);
            (out + inc) as u32
        }
        _ => 0,
    };

    if let Ok(Some(mut entity)) = store.get_entity(canonical_id).await {
        entity.centrality = local_fallback(degree);
        entity.updated_at = Utc::now();
        let _ = store.upsert_entity(entity).await;
    }

    stats.centrality_recalculated = true;
    stats.centrality_method = Some("local_fallback".to_string());
}

/// Used by callers that need a trait-object-free `Arc` handle (the
/// worker's fire-and-forget centrality kickoff, §4.7.1).
pub type SharedCentralityClient = Arc<dyn CentralityClient>;

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_graph::InMemoryGraphDriver;
    use uuid::Uuid;

    fn config() -> MergeConfig {
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

    async fn setup_pair(store: &InMemoryGraphDriver) -> (Entity, Entity) {
        let canonical = Entity::new(Uuid::new_v4(), "B'", "t");
        let duplicate = Entity::new(Uuid::new_v4(), "B", "t");
        store.upsert_entity(canonical.clone()).await.unwrap();
        store.upsert_entity(duplicate.clone()).await.unwrap();
        (canonical, duplicate)
    }

    #[tokio::test]
    async fn merge_transfers_incoming_edges_and_unions_episodes() {
        let store = InMemoryGraphDriver::new();
        let (canonical, duplicate) = setup_pair(&store).await;
        let a = Entity::new(Uuid::new_v4(), "A", "t");
        store.upsert_entity(a.clone()).await.unwrap();

        let e1 = Uuid::new_v4();
        let mut edge1 = Edge::new(Uuid::new_v4(), a.id, canonical.id, "t", Some("KNOWS".to_string()));
        edge1.episodes = vec![e1];
        store.upsert_edge(edge1).await.unwrap();

        let e2 = Uuid::new_v4();
        let mut edge2 = Edge::new(Uuid::new_v4(), a.id, duplicate.id, "t", Some("KNOWS".to_string()));
        edge2.episodes = vec![e2];
        store.upsert_edge(edge2).await.unwrap();

        let stats = merge(
            &store,
            None,
            &config(),
            MergeRequest {
                canonical_id: canonical.id,
                duplicate_id: duplicate.id,
                finalization: Finalization::Delete,
                write_audit_edge: true,
                allow_cross_tenant_merge: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(stats.conflicts_resolved, 1);

        let remaining = store.outgoing_edges(a.id).await.unwrap();
        let knows: Vec<_> = remaining.iter().filter(|e| e.name == "KNOWS").collect();
        assert_eq!(knows.len(), 1);
        assert!(knows[0].episodes.contains(&e1));
        assert!(knows[0].episodes.contains(&e2));

        let dup_incoming = store.incoming_edges(duplicate.id).await.unwrap();
        assert!(dup_incoming.iter().all(|e| e.name == AUDIT_EDGE_NAME));
        assert!(store.get_entity(duplicate.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn merge_writes_audit_edge_with_merged_at() {
        let store = InMemoryGraphDriver::new();
        let (canonical, duplicate) = setup_pair(&store).await;

        merge(
            &store,
            None,
            &config(),
            MergeRequest {
                canonical_id: canonical.id,
                duplicate_id: duplicate.id,
                finalization: Finalization::Tombstone,
                write_audit_edge: true,
                allow_cross_tenant_merge: false,
            },
        )
        .await
        .unwrap();

        let audit_edges: Vec<_> = store
            .outgoing_edges(duplicate.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.name == AUDIT_EDGE_NAME)
            .collect();
        assert_eq!(audit_edges.len(), 1);
        assert!(audit_edges[0].attributes.contains_key("merged_at"));
    }

    #[tokio::test]
    async fn merge_is_idempotent_on_second_run() {
        let store = InMemoryGraphDriver::new();
        let (canonical, duplicate) = setup_pair(&store).await;

        let request = || MergeRequest {
            canonical_id: canonical.id,
            duplicate_id: duplicate.id,
            finalization: Finalization::Delete,
            write_audit_edge: true,
            allow_cross_tenant_merge: false,
        };

        merge(&store, None, &config(), request()).await.unwrap();
        let second = merge(&store, None, &config(), request()).await.unwrap();

        assert_eq!(second.edges_transferred, 0);
        assert!(second.errors.is_empty());
    }

    #[tokio::test]
    async fn cross_tenant_merge_rejected_without_flag() {
        let store = InMemoryGraphDriver::new();
        let canonical = Entity::new(Uuid::new_v4(), "A", "tenant-a");
        let duplicate = Entity::new(Uuid::new_v4(), "A", "tenant-b");
        store.upsert_entity(canonical.clone()).await.unwrap();
        store.upsert_entity(duplicate.clone()).await.unwrap();

        let result = merge(
            &store,
            None,
            &config(),
            MergeRequest {
                canonical_id: canonical.id,
                duplicate_id: duplicate.id,
                finalization: Finalization::Delete,
                write_audit_edge: false,
                allow_cross_tenant_merge: false,
            },
        )
        .await;

        assert!(matches!(result, Err(MergeError::CrossTenantNotAllowed { .. })));
    }

    #[tokio::test]
    async fn missing_duplicate_is_a_noop_not_an_error() {
        let store = InMemoryGraphDriver::new();
        let canonical = Entity::new(Uuid::new_v4(), "A", "t");
        store.upsert_entity(canonical.clone()).await.unwrap();

        let stats = merge(
            &store,
            None,
            &config(),
            MergeRequest {
                canonical_id: canonical.id,
                duplicate_id: Uuid::new_v4(),
                finalization: Finalization::Delete,
                write_audit_edge: false,
                allow_cross_tenant_merge: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(stats.edges_transferred, 0);
        assert_eq!(stats.nodes_deleted, 0);
    }

    #[tokio::test]
    async fn centrality_falls_back_locally_when_no_client_configured() {
        let store = InMemoryGraphDriver::new();
        let (canonical, duplicate) = setup_pair(&store).await;

        let stats = merge(
            &store,
            None,
            &config(),
            MergeRequest {
                canonical_id: canonical.id,
                duplicate_id: duplicate.id,
                finalization: Finalization::Delete,
                write_audit_edge: false,
                allow_cross_tenant_merge: false,
            },
        )
        .await
        .unwrap();

        assert!(stats.centrality_recalculated);
        assert_eq!(stats.centrality_method.as_deref(), Some("local_fallback"));
        let refreshed = store.get_entity(canonical.id).await.unwrap().unwrap();
        assert!(refreshed.centrality.in_bounds());
    }
}
