//! Per-episode resolution of newly extracted nodes against the graph
//! (§4.5 "Per-episode resolution"). Strictly sequential within an
//! episode to avoid the intra-episode race where two references to the
//! same name create two canonical entities.

use std::collections::HashMap;

use kairos_core::identity::{self, NormalizationMode};
use kairos_core::Entity;
use kairos_graph::GraphDriver;
use kairos_llm::{judge_duplicates, DedupCandidateSet, LlmProvider};
use uuid::Uuid;

/// One entity candidate extracted from an episode by the LLM layer.
#[derive(Debug, Clone)]
pub struct ExtractedCandidate {
    pub name: String,
    pub tenant: String,
    pub labels: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Outcome of resolving one extracted candidate.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Reused an identity already resolved earlier in this episode.
    ReusedInEpisode { resolved_id: Uuid },
    /// Matched an existing stored entity exactly by name.
    MatchedExisting { entity: Entity },
    /// No match found anywhere; a new entity should be created with this id.
    New { new_id: Uuid },
    /// Deferred to LLM-assisted resolution; `candidate_ids` are ordered
    /// parallel to the candidate names offered to the judge.
    LlmResolved { entity: Option<Entity> },
}

/// Resolves a batch of extracted candidates from one episode, strictly
/// in order. `cross_tenant` controls whether the in-episode map keys on
/// `(name, tenant)` or `name` alone. `use_deterministic_ids` and
/// `normalization_mode` control how a brand-new candidate's id is minted
/// (§4.4's `entity_id` derivation, or a random v4 when disabled).
pub struct EpisodeResolver<'a> {
    store: &'a dyn GraphDriver,
    cross_tenant: bool,
    use_deterministic_ids: bool,
    normalization_mode: NormalizationMode,
    in_episode: HashMap<String, Uuid>,
}

impl<'a> EpisodeResolver<'a> {
    pub fn new(
        store: &'a dyn GraphDriver,
        cross_tenant: bool,
        use_deterministic_ids: bool,
        normalization_mode: NormalizationMode,
    ) -> Self {
        Self { store, cross_tenant, use_deterministic_ids, normalization_mode, in_episode: HashMap::new() }
    }

    fn episode_key(&self, name: &str, tenant: &str) -> String {
        if self.cross_tenant {
            name.to_string()
        } else {
            format!("{tenant}\u{0}{name}")
        }
    }

    /// Resolve one candidate. Steps 1–3 of §4.5; step 4 (LLM-assisted) is
    /// handled separately via [`resolve_deferred`] since it needs the
    /// full batch of deferred nodes for a hybrid candidate search.
    pub async fn resolve_step_1_to_3(
        &mut self,
        candidate: &ExtractedCandidate,
    ) -> Result<Resolution, kairos_graph::GraphError> {
        let key = self.episode_key(&candidate.name, &candidate.tenant);

        if let Some(resolved_id) = self.in_episode.get(&key).copied() {
            return Ok(Resolution::ReusedInEpisode { resolved_id });
        }

        if let Some(entity) = self.store.find_entity_by_name(&candidate.tenant, &candidate.name).await? {
            self.in_episode.insert(key, entity.id);
            return Ok(Resolution::MatchedExisting { entity });
        }

        let normalized = identity::normalize(&candidate.name, self.normalization_mode);
        let new_id = identity::derive_entity_id(self.use_deterministic_ids, &normalized, &candidate.tenant);
        self.in_episode.insert(key, new_id);
        Ok(Resolution::New { new_id })
    }
}

/// Step 4: hybrid similarity search (lexical + embedding, reciprocal-rank
/// fused) over `pool`, then ask the LLM to judge each deferred node
/// against its candidate list.
pub async fn resolve_deferred(
    provider: &dyn LlmProvider,
    deferred: &[ExtractedCandidate],
    pool: &[Entity],
    top_k: usize,
) -> Vec<Resolution> {
    if deferred.is_empty() {
        return Vec::new();
    }

    let mut candidate_sets = Vec::with_capacity(deferred.len());
    let mut pools = Vec::with_capacity(deferred.len());
    for node in deferred {
        let ranked = hybrid_rank(node, pool, top_k);
        let names = ranked.iter().map(|e| e.name.clone()).collect();
        candidate_sets.push(DedupCandidateSet { node_name: node.name.clone(), candidates: names });
        pools.push(ranked);
    }

    let decisions = match judge_duplicates(provider, &candidate_sets).await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "dedup judge call failed, treating all deferred nodes as new");
            return deferred.iter().map(|_| Resolution::LlmResolved { entity: None }).collect();
        }
    };

    deferred
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let decision = decisions.iter().find(|d| d.node_name == node.name);
            let entity = decision
                .and_then(|d| d.duplicate_idx)
                .and_then(|idx| pools[i].get(idx).cloned());
            Resolution::LlmResolved { entity }
        })
        .collect()
}

/// Rank `pool` against `node` combining a lexical (word-overlap) and a
/// semantic (cosine) ranking via reciprocal-rank fusion, returning the
/// top `top_k` candidates.
fn hybrid_rank(node: &ExtractedCandidate, pool: &[Entity], top_k: usize) -> Vec<Entity> {
    let lexical_normalized = kairos_core::identity::basic_normalize(&node.name);

    let mut lexical_order: Vec<usize> = (0..pool.len()).collect();
    lexical_order.sort_by(|&a, &b| {
        let sa = kairos_core::identity::name_similarity(
            &lexical_normalized,
            &kairos_core::identity::basic_normalize(&pool[a].name),
        );
        let sb = kairos_core::identity::name_similarity(
            &lexical_normalized,
            &kairos_core::identity::basic_normalize(&pool[b].name),
        );
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut semantic_order: Vec<usize> = (0..pool.len()).collect();
    if let Some(embedding) = &node.embedding {
        semantic_order.sort_by(|&a, &b| {
            let sa = cosine(embedding, pool[a].name_embedding.as_deref());
            let sb = cosine(embedding, pool[b].name_embedding.as_deref());
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    let mut fused_scores = vec![0.0_f64; pool.len()];
    const RRF_K: f64 = 60.0;
    for (rank, &idx) in lexical_order.iter().enumerate() {
        fused_scores[idx] += 1.0 / (RRF_K + rank as f64 + 1.0);
    }
    for (rank, &idx) in semantic_order.iter().enumerate() {
        fused_scores[idx] += 1.0 / (RRF_K + rank as f64 + 1.0);
    }

    let mut ranked: Vec<usize> = (0..pool.len()).collect();
    ranked.sort_by(|&a, &b| fused_scores[b].partial_cmp(&fused_scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    ranked.into_iter().take(top_k).map(|i| pool[i].clone()).collect()
}

fn cosine(a: &[f32], b: Option<&[f32]>) -> f64 {
    match b {
        Some(b) if !a.is_empty() && a.len() == b.len() => {
            let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
            let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
            if na <= f64::EPSILON || nb <= f64::EPSILON { 0.0 } else { dot / (na * nb) }
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_graph::InMemoryGraphDriver;

    fn candidate(name: &str, tenant: &str) -> ExtractedCandidate {
        ExtractedCandidate { name: name.to_string(), tenant: tenant.to_string(), labels: vec![], embedding: None }
    }

    #[tokio::test]
    async fn second_reference_in_same_episode_reuses_identity() {
        let store = InMemoryGraphDriver::new();
        let mut resolver = EpisodeResolver::new(&store, false, false, NormalizationMode::Basic);

        let first = resolver.resolve_step_1_to_3(&candidate("Claude", "t1")).await.unwrap();
        let Resolution::New { new_id } = first else { panic!("expected New") };

        let second = resolver.resolve_step_1_to_3(&candidate("Claude", "t1")).await.unwrap();
        match second {
            Resolution::ReusedInEpisode { resolved_id } => assert_eq!(resolved_id, new_id),
            other => panic!("expected ReusedInEpisode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn existing_entity_is_matched_by_exact_name() {
        let store = InMemoryGraphDriver::new();
        let existing = Entity::new(Uuid::new_v4(), "Acme".to_string(), "t1".to_string());
        store.upsert_entity(existing.clone()).await.unwrap();

        let mut resolver = EpisodeResolver::new(&store, false, false, NormalizationMode::Basic);
        let result = resolver.resolve_step_1_to_3(&candidate("Acme", "t1")).await.unwrap();
        match result {
            Resolution::MatchedExisting { entity } => assert_eq!(entity.id, existing.id),
            other => panic!("expected MatchedExisting, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cross_tenant_mode_keys_on_name_alone() {
        let store = InMemoryGraphDriver::new();
        let mut resolver = EpisodeResolver::new(&store, true, false, NormalizationMode::Basic);

        let first = resolver.resolve_step_1_to_3(&candidate("Claude", "t1")).await.unwrap();
        let Resolution::New { new_id } = first else { panic!("expected New") };

        let second = resolver.resolve_step_1_to_3(&candidate("Claude", "t2")).await.unwrap();
        match second {
            Resolution::ReusedInEpisode { resolved_id } => assert_eq!(resolved_id, new_id),
            other => panic!("expected ReusedInEpisode across tenants, got {other:?}"),
        }
    }
}
