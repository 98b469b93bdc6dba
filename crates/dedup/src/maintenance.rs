//! Offline maintenance sweep over a tenant (§4.5 "Maintenance sweep").
//!
//! Four phases, each operating on the remainder after earlier phases:
//! exact name → case-insensitive name → enhanced-normalized name (guarded
//! by the compound-name check) → embedding similarity (transitively
//! clustered, also compound-guarded).

use std::collections::{HashMap, HashSet};

use kairos_core::identity::{self, NormalizationMode};
use kairos_core::Entity;
use uuid::Uuid;

/// A group of entities judged duplicates of each other by one phase.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub phase: SweepPhase,
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Exact,
    CaseInsensitive,
    Normalized,
    EmbeddingSimilarity,
}

/// Runs the four-phase sweep over `entities`, returning the duplicate
/// groups found and the set of entities no phase grouped.
pub fn sweep(entities: &[Entity], embedding_threshold: f64) -> (Vec<DuplicateGroup>, Vec<Uuid>) {
    let mut remaining: Vec<&Entity> = entities.iter().collect();
    let mut groups = Vec::new();

    let (exact_groups, rest) = group_by(&remaining, SweepPhase::Exact, |e| e.name.clone());
    groups.extend(exact_groups);
    remaining = rest;

    let (ci_groups, rest) = group_by(&remaining, SweepPhase::CaseInsensitive, |e| e.name.to_lowercase());
    groups.extend(ci_groups);
    remaining = rest;

    let (norm_groups, rest) = group_by_guarded(&remaining, SweepPhase::Normalized, |e| {
        identity::normalize(&e.name, NormalizationMode::Enhanced)
    });
    groups.extend(norm_groups);
    remaining = rest;

    let (embed_groups, rest) = group_by_embedding_similarity(&remaining, embedding_threshold);
    groups.extend(embed_groups);
    remaining = rest;

    let leftover = remaining.iter().map(|e| e.id).collect();
    (groups, leftover)
}

/// Group by an exact key; any group with more than one member is a
/// duplicate group. No compound-guard — used for exact/case-insensitive
/// phases, which don't need one.
fn group_by<'a, F: Fn(&Entity) -> String>(
    pool: &[&'a Entity],
    phase: SweepPhase,
    key_fn: F,
) -> (Vec<DuplicateGroup>, Vec<&'a Entity>) {
    let mut buckets: HashMap<String, Vec<&Entity>> = HashMap::new();
    for &e in pool {
        buckets.entry(key_fn(e)).or_default().push(e);
    }

    let mut groups = Vec::new();
    let mut leftover = Vec::new();
    for (_, members) in buckets {
        if members.len() > 1 {
            groups.push(DuplicateGroup { phase, member_ids: members.iter().map(|e| e.id).collect() });
        } else {
            leftover.extend(members);
        }
    }
    (groups, leftover)
}

/// Same as [`group_by`], but a group containing any pair that fails the
/// compound-name guard is skipped entirely (its members fall through
/// unmodified to the next phase).
fn group_by_guarded<'a, F: Fn(&Entity) -> String>(
    pool: &[&'a Entity],
    phase: SweepPhase,
    key_fn: F,
) -> (Vec<DuplicateGroup>, Vec<&'a Entity>) {
    let mut buckets: HashMap<String, Vec<&Entity>> = HashMap::new();
    for &e in pool {
        buckets.entry(key_fn(e)).or_default().push(e);
    }

    let mut groups = Vec::new();
    let mut leftover = Vec::new();
    for (_, members) in buckets {
        if members.len() <= 1 {
            leftover.extend(members);
            continue;
        }
        let has_compound_pair = members.iter().enumerate().any(|(i, a)| {
            members[i + 1..].iter().any(|b| {
                identity::is_compound_pair(&identity::normalize(&a.name, NormalizationMode::Basic), &identity::normalize(&b.name, NormalizationMode::Basic))
            })
        });
        if has_compound_pair {
            leftover.extend(members);
        } else {
            groups.push(DuplicateGroup { phase, member_ids: members.iter().map(|e| e.id).collect() });
        }
    }
    (groups, leftover)
}

/// Pairwise cosine over L2-normalized name embeddings; pairs meeting
/// `threshold` form a cluster via transitive union-find. Compound-guard
/// excludes spurious merges.
fn group_by_embedding_similarity<'a>(
    pool: &[&'a Entity],
    threshold: f64,
) -> (Vec<DuplicateGroup>, Vec<&'a Entity>) {
    let with_embeddings: Vec<&Entity> = pool.iter().filter(|e| e.has_embedding()).copied().collect();
    let n = with_embeddings.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    fn union(parent: &mut [usize], a: usize, b: usize) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent[ra] = rb;
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let a = with_embeddings[i];
            let b = with_embeddings[j];
            let sim = cosine(a.name_embedding.as_deref().unwrap_or(&[]), b.name_embedding.as_deref().unwrap_or(&[]));
            if sim < threshold {
                continue;
            }
            let na = identity::normalize(&a.name, NormalizationMode::Basic);
            let nb = identity::normalize(&b.name, NormalizationMode::Basic);
            if identity::is_compound_pair(&na, &nb) {
                continue;
            }
            union(&mut parent, i, j);
        }
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }

    let mut groups = Vec::new();
    let mut clustered: HashSet<usize> = HashSet::new();
    for members in clusters.values() {
        if members.len() > 1 {
            groups.push(DuplicateGroup {
                phase: SweepPhase::EmbeddingSimilarity,
                member_ids: members.iter().map(|&i| with_embeddings[i].id).collect(),
            });
            clustered.extend(members);
        }
    }

    let clustered_ids: HashSet<Uuid> = groups.iter().flat_map(|g| g.member_ids.iter().copied()).collect();
    let leftover = pool.iter().filter(|e| !clustered_ids.contains(&e.id)).copied().collect();
    (groups, leftover)
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na <= f64::EPSILON || nb <= f64::EPSILON {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> Entity {
        Entity::new(Uuid::new_v4(), name.to_string(), "t1".to_string())
    }

    #[test]
    fn exact_phase_groups_identical_names() {
        let entities = vec![entity("Claude"), entity("Claude"), entity("Other")];
        let (groups, leftover) = sweep(&entities, 0.9);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].phase, SweepPhase::Exact);
        assert_eq!(leftover.len(), 1);
    }

    #[test]
    fn case_insensitive_phase_catches_case_variants() {
        let entities = vec![entity("claude"), entity("CLAUDE")];
        let (groups, _) = sweep(&entities, 0.9);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].phase, SweepPhase::CaseInsensitive);
    }

    #[test]
    fn compound_guard_prevents_normalized_merge() {
        let entities = vec![entity("BMO"), entity("BMO Corporate Travel")];
        let (groups, leftover) = sweep(&entities, 0.9);
        assert!(groups.is_empty());
        assert_eq!(leftover.len(), 2);
    }

    #[test]
    fn embedding_phase_clusters_similar_vectors_transitively() {
        let mut a = entity("Acme Inc");
        a.name_embedding = Some(vec![1.0, 0.0]);
        let mut b = entity("Acme Corporation");
        b.name_embedding = Some(vec![0.99, 0.01]);
        let mut c = entity("Acme Co");
        c.name_embedding = Some(vec![0.98, 0.02]);
        let entities = vec![a, b, c];
        let (groups, leftover) = sweep(&entities, 0.9);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].member_ids.len(), 3);
        assert!(leftover.is_empty());
    }
}
