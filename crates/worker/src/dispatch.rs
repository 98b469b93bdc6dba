//! Dispatch by task kind (§4.7.1) and the shared validated-save path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kairos_core::config::Config;
use kairos_core::identity::{self, NormalizationMode};
use kairos_core::{Edge, Entity, EntityId, IngestionTask, TaskKind};
use kairos_dedup::{resolve_deferred, EpisodeResolver, ExtractedCandidate, Resolution};
use kairos_graph::GraphDriver;
use kairos_llm::LlmProvider;
use kairos_merge::{merge_edge_properties, CentralityClient, Finalization, MergeRequest};
use kairos_notify::{IngestEvent, WebhookDispatcher};
use kairos_validation::hooks::{HookKind, HookRegistry, NameNormalizationHook, RequiredEntityFields};
use kairos_validation::orchestrator::{IssueSeverity, Phase, ValidationOrchestrator};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::extraction::extract_from_content;

/// Shared, cloneable handle to everything dispatch needs. Cheap to clone:
/// every field is an `Arc` or owned config data.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn GraphDriver>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub centrality: Option<Arc<dyn CentralityClient>>,
    pub notify: Option<Arc<WebhookDispatcher>>,
    pub config: Arc<Config>,
    pub hooks: Arc<HookRegistry>,
}

pub fn default_hook_registry() -> HookRegistry {
    let mut hooks = HookRegistry::new();
    hooks.register(HookKind::PreEntity, "required_entity_fields", 0, Box::new(RequiredEntityFields));
    hooks.register(HookKind::PreEntity, "name_normalization", 10, Box::new(NameNormalizationHook { enabled: true }));
    hooks
}

/// Dispatch one task by kind, per §4.7.1.
pub async fn dispatch(ctx: &WorkerContext, task: &IngestionTask) -> Result<(), WorkerError> {
    match task.kind {
        TaskKind::Episode => dispatch_episode(ctx, task).await,
        TaskKind::Entity => dispatch_entity(ctx, task).await,
        TaskKind::Relationship => dispatch_relationship(ctx, task).await,
        TaskKind::Deduplication => dispatch_deduplication(ctx, task).await,
        TaskKind::Batch => dispatch_batch(ctx, task).await,
    }
}

fn payload_field<T: for<'de> Deserialize<'de>>(task: &IngestionTask, field: &str) -> Result<T, WorkerError> {
    let value = task
        .payload
        .get(field)
        .ok_or_else(|| WorkerError::BadPayload(format!("missing field: {field}")))?;
    serde_json::from_value(value.clone()).map_err(|e| WorkerError::BadPayload(format!("field {field}: {e}")))
}

fn require_tenant(task: &IngestionTask) -> Result<&str, WorkerError> {
    task.tenant.as_deref().ok_or_else(|| WorkerError::BadPayload("task has no tenant".to_string()))
}

// ── episode ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct EpisodePayload {
    name: String,
    content: String,
    #[serde(default)]
    source_description: String,
    #[serde(default)]
    valid_at: Option<DateTime<Utc>>,
    /// Pre-extracted entities, when a producer has already run extraction.
    #[serde(default)]
    entities: Vec<RawCandidate>,
    #[serde(default)]
    edges: Vec<RawEdgePayload>,
}

#[derive(Deserialize)]
struct RawCandidate {
    name: String,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct RawEdgePayload {
    source: String,
    target: String,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default)]
    fact: Option<String>,
}

async fn dispatch_episode(ctx: &WorkerContext, task: &IngestionTask) -> Result<(), WorkerError> {
    let tenant = require_tenant(task)?.to_string();
    let payload: EpisodePayload = payload_field(task, "episode").or_else(|_| {
        // Allow a flatter payload shape where `episode` fields are top-level.
        serde_json::from_value(Value::Object(task.payload.clone().into_iter().collect()))
            .map_err(|e| WorkerError::BadPayload(format!("episode payload: {e}")))
    })?;
    let episode_id = Uuid::new_v4();

    let (candidates, edge_specs): (Vec<ExtractedCandidate>, Vec<RawEdgePayload>) = if !payload.entities.is_empty() {
        (
            payload
                .entities
                .into_iter()
                .map(|c| ExtractedCandidate { name: c.name, tenant: tenant.clone(), labels: c.labels, embedding: None })
                .collect(),
            payload.edges,
        )
    } else if let Some(llm) = &ctx.llm {
        let graph = extract_from_content(llm.as_ref(), &tenant, &payload.content).await?;
        let edges = graph
            .edges
            .into_iter()
            .map(|e| RawEdgePayload { source: e.source_name, target: e.target_name, relation: e.relation, fact: e.fact })
            .collect();
        (graph.entities, edges)
    } else {
        (Vec::new(), Vec::new())
    };

    let resolved_ids = resolve_candidates(ctx, &tenant, &candidates).await?;

    let mut name_to_id: std::collections::HashMap<String, EntityId> = std::collections::HashMap::new();
    for (candidate, id) in candidates.iter().zip(resolved_ids.iter()) {
        name_to_id.insert(candidate.name.clone(), *id);
    }

    for edge_spec in edge_specs {
        let (Some(&source_id), Some(&target_id)) =
            (name_to_id.get(&edge_spec.source), name_to_id.get(&edge_spec.target))
        else {
            tracing::warn!(source = %edge_spec.source, target = %edge_spec.target, "episode edge references unresolved entity, skipping");
            continue;
        };
        save_edge(ctx, &tenant, source_id, target_id, edge_spec.relation.as_deref(), edge_spec.fact, episode_id).await?;
    }

    if let Some(notify) = &ctx.notify {
        let _ = notify.emit(IngestEvent::new(
            "episode.ingested",
            Some(tenant),
            serde_json::json!({ "episode_id": episode_id, "name": payload.name, "entity_count": resolved_ids.len() }),
        ));
    }

    kick_off_centrality(ctx, resolved_ids);
    Ok(())
}

/// Resolve each candidate sequentially (§4.5 "strictly sequential"),
/// creating new entities as needed and deferring ambiguous ones to the
/// LLM-assisted hybrid-rank step when a provider is configured.
async fn resolve_candidates(
    ctx: &WorkerContext,
    tenant: &str,
    candidates: &[ExtractedCandidate],
) -> Result<Vec<EntityId>, WorkerError> {
    let cross_tenant = ctx.config.identity.cross_tenant_dedup;
    let mut resolver = EpisodeResolver::new(ctx.store.as_ref(), cross_tenant);
    let mut resolved = Vec::with_capacity(candidates.len());
    let mut deferred_idx = Vec::new();

    for (idx, candidate) in candidates.iter().enumerate() {
        match resolver.resolve_step_1_to_3(candidate).await? {
            Resolution::ReusedInEpisode { resolved_id } => resolved.push(resolved_id),
            Resolution::MatchedExisting { entity } => resolved.push(entity.id),
            Resolution::New { new_id } => {
                resolved.push(new_id);
                deferred_idx.push(idx);
            }
            Resolution::LlmResolved { .. } => unreachable!("resolve_step_1_to_3 never returns LlmResolved"),
        }
    }

    if let Some(llm) = &ctx.llm {
        if !deferred_idx.is_empty() {
            let pool = ctx.store.list_entities(tenant).await?;
            let deferred_candidates: Vec<ExtractedCandidate> = deferred_idx.iter().map(|&i| candidates[i].clone()).collect();
            let decisions = resolve_deferred(llm.as_ref(), &deferred_candidates, &pool, 5).await;
            for (pos, decision) in deferred_idx.iter().zip(decisions.into_iter()) {
                if let Resolution::LlmResolved { entity: Some(existing) } = decision {
                    resolved[*pos] = existing.id;
                }
            }
        }
    }

    for (candidate, &id) in candidates.iter().zip(resolved.iter()) {
        if ctx.store.get_entity(id).await?.is_some() {
            continue;
        }
        let normalized = normalize_name(ctx, &candidate.name);
        let mut entity = Entity::new(id, candidate.name.clone(), tenant.to_string());
        for label in &candidate.labels {
            if !entity.labels.contains(label) {
                entity.labels.push(label.clone());
            }
        }
        entity.name_embedding = candidate.embedding.clone();
        let _ = normalized;
        save_entity_validated(ctx, entity).await?;
    }

    Ok(resolved)
}

fn normalize_name(ctx: &WorkerContext, name: &str) -> String {
    if !ctx.config.identity.normalize_names {
        return name.to_string();
    }
    let mode = if ctx.config.identity.enhanced_normalization { NormalizationMode::Enhanced } else { NormalizationMode::Basic };
    identity::normalize(name, mode)
}

// ── entity ───────────────────────────────────────────────────────────

async fn dispatch_entity(ctx: &WorkerContext, task: &IngestionTask) -> Result<(), WorkerError> {
    let tenant = require_tenant(task)?.to_string();
    let name: String = payload_field(task, "name")?;
    let labels: Vec<String> = payload_field(task, "labels").unwrap_or_default();
    let summary: Option<String> = payload_field(task, "summary").ok();

    let existing = ctx.store.find_entity_by_name(&tenant, &name).await?;
    if existing.is_some() {
        // "Duplicate" entity-save errors are success per §4.7.3.
        return Ok(());
    }

    let id = identity::derive_entity_id(ctx.config.identity.use_deterministic_ids, &normalize_name(ctx, &name), &tenant);
    let mut entity = Entity::new(id, name, tenant);
    for label in labels {
        if !entity.labels.contains(&label) {
            entity.labels.push(label);
        }
    }
    entity.summary = summary;
    save_entity_validated(ctx, entity).await?;
    Ok(())
}

// ── relationship ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RelationshipPayload {
    source_name: String,
    target_name: String,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default)]
    fact: Option<String>,
}

async fn dispatch_relationship(ctx: &WorkerContext, task: &IngestionTask) -> Result<(), WorkerError> {
    let tenant = require_tenant(task)?.to_string();
    let payload: RelationshipPayload = payload_field(task, "relationship").or_else(|_| {
        serde_json::from_value(Value::Object(task.payload.clone().into_iter().collect()))
            .map_err(|e| WorkerError::BadPayload(format!("relationship payload: {e}")))
    })?;

    let source = materialize_entity(ctx, &tenant, &payload.source_name).await?;
    let target = materialize_entity(ctx, &tenant, &payload.target_name).await?;

    save_edge(ctx, &tenant, source.id, target.id, payload.relation.as_deref(), payload.fact, Uuid::new_v4()).await?;
    kick_off_centrality(ctx, vec![source.id, target.id]);
    Ok(())
}

async fn materialize_entity(ctx: &WorkerContext, tenant: &str, name: &str) -> Result<Entity, WorkerError> {
    if let Some(existing) = ctx.store.find_entity_by_name(tenant, name).await? {
        return Ok(existing);
    }
    let id = identity::derive_entity_id(ctx.config.identity.use_deterministic_ids, &normalize_name(ctx, name), tenant);
    let entity = Entity::new(id, name.to_string(), tenant.to_string());
    save_entity_validated(ctx, entity.clone()).await?;
    Ok(entity)
}

async fn save_edge(
    ctx: &WorkerContext,
    tenant: &str,
    source_id: EntityId,
    target_id: EntityId,
    relation: Option<&str>,
    fact: Option<String>,
    episode_id: Uuid,
) -> Result<(), WorkerError> {
    let id = identity::derive_edge_id(
        ctx.config.identity.use_deterministic_ids,
        &source_id.to_string(),
        &target_id.to_string(),
        relation,
        tenant,
    );

    let existing = ctx
        .store
        .outgoing_edges(source_id)
        .await?
        .into_iter()
        .find(|e| e.id == id || (e.target_id == target_id && e.name == kairos_core::normalize_edge_name(relation)));

    let mut edge = match existing {
        Some(mut found) => {
            let mut incoming = Edge::new(id, source_id, target_id, tenant.to_string(), relation.map(str::to_string));
            incoming.fact = fact.clone();
            incoming.episodes = vec![episode_id];
            merge_edge_properties(&mut found, &incoming);
            found
        }
        None => {
            let mut edge = Edge::new(id, source_id, target_id, tenant.to_string(), relation.map(str::to_string));
            edge.fact = fact;
            edge.episodes = vec![episode_id];
            edge
        }
    };
    edge.validate_invariants().map_err(WorkerError::Permanent)?;
    ctx.store.upsert_edge(edge).await?;
    Ok(())
}

// ── deduplication ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DeduplicationPayload {
    #[serde(default)]
    tenants: Vec<String>,
    #[serde(default = "default_similarity_threshold")]
    similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    0.85
}

async fn dispatch_deduplication(ctx: &WorkerContext, task: &IngestionTask) -> Result<(), WorkerError> {
    let payload: DeduplicationPayload = payload_field(task, "deduplication").unwrap_or(DeduplicationPayload {
        tenants: task.tenant.clone().into_iter().collect(),
        similarity_threshold: default_similarity_threshold(),
    });

    for tenant in &payload.tenants {
        let entities = ctx.store.list_entities(tenant).await?;
        let (groups, _leftover) = kairos_dedup::sweep(&entities, payload.similarity_threshold);
        tracing::info!(tenant, groups = groups.len(), "maintenance sweep found duplicate groups");

        for group in groups {
            let members: Vec<Entity> = group
                .member_ids
                .iter()
                .filter_map(|id| entities.iter().find(|e| e.id == *id).cloned())
                .collect();
            let Some(primary) = kairos_dedup::select_primary(&members) else { continue };

            for member in &members {
                if member.id == primary.id {
                    continue;
                }
                let stats = kairos_merge::merge(
                    ctx.store.as_ref(),
                    ctx.centrality.as_deref(),
                    &ctx.config.merge,
                    MergeRequest {
                        canonical_id: primary.id,
                        duplicate_id: member.id,
                        finalization: Finalization::Delete,
                        write_audit_edge: ctx.config.merge.write_audit_edge,
                        allow_cross_tenant_merge: ctx.config.merge.allow_cross_tenant_merge,
                    },
                )
                .await?;
                tracing::debug!(canonical = %primary.id, duplicate = %member.id, edges = stats.edges_transferred, "maintenance merge applied");
            }
        }
    }
    Ok(())
}

// ── batch ────────────────────────────────────────────────────────────

async fn dispatch_batch(ctx: &WorkerContext, task: &IngestionTask) -> Result<(), WorkerError> {
    let operations: Vec<IngestionTask> = payload_field(task, "operations")?;
    if operations.is_empty() {
        return Ok(());
    }

    let mut failures = 0usize;
    for op in &operations {
        if let Err(e) = Box::pin(dispatch(ctx, op)).await {
            failures += 1;
            tracing::warn!(task_id = %op.id, error = %e, "batch operation failed");
        }
    }

    if failures == operations.len() {
        return Err(WorkerError::Transient(format!("all {failures} batch operations failed")));
    }
    Ok(())
}

// ── shared validated-save path ──────────────────────────────────────

async fn save_entity_validated(ctx: &WorkerContext, mut entity: Entity) -> Result<Entity, WorkerError> {
    if ctx.config.validation.pre_save_enabled {
        let data = serde_json::json!({
            "id": entity.id.to_string(),
            "name": entity.name,
            "tenant": entity.tenant,
        });
        let result = ctx.hooks.execute(HookKind::PreEntity, &data);
        if !result.success {
            return Err(WorkerError::Permanent(
                result.failure_reason.unwrap_or_else(|| "pre-save hook failed".to_string()),
            ));
        }
        if result.skipped {
            return Ok(entity);
        }
        if let Some(Value::String(name)) = result.data.as_ref().and_then(|d| d.get("name")).cloned() {
            entity.name = name;
        }
    }

    entity.validate_invariants().map_err(WorkerError::Permanent)?;
    let saved = ctx.store.upsert_entity(entity).await?;

    if ctx.config.validation.post_save_enabled {
        let mut orch = ValidationOrchestrator::new(ctx.config.validation.clone(), saved.id);
        orch.run_phase(Phase::PostSave, "post_save", || {
            let mut issues = Vec::new();
            let centrality_check = kairos_validation::integrity::centrality_bounds(&saved.centrality);
            if !centrality_check.passed {
                issues.push(
                    kairos_validation::orchestrator::ValidationIssue::new(
                        Phase::Centrality,
                        IssueSeverity::Error,
                        centrality_check.message,
                    )
                    .with_entity(saved.id)
                    .with_field("centrality"),
                );
            }
            let temporal_check = kairos_validation::integrity::temporal_consistency_entity(&saved);
            if !temporal_check.passed {
                issues.push(
                    kairos_validation::orchestrator::ValidationIssue::new(Phase::PostSave, IssueSeverity::Warning, temporal_check.message)
                        .with_entity(saved.id),
                );
            }
            issues
        });
        let report = orch.finish();
        if !report.is_valid() {
            return Err(WorkerError::Permanent(format!(
                "post-save validation failed for entity {}: {} critical issue(s)",
                saved.id,
                report.critical_count()
            )));
        }
    }

    Ok(saved)
}

fn kick_off_centrality(ctx: &WorkerContext, ids: Vec<EntityId>) {
    // Fire-and-forget per §4.7.1: don't let a centrality-service hiccup
    // fail the task that already committed its graph writes.
    let Some(client) = ctx.centrality.clone() else { return };
    tokio::spawn(async move {
        for id in ids {
            if !client.update_node(id).await {
                tracing::debug!(entity_id = %id, "fire-and-forget centrality update failed");
            }
        }
    });
}
