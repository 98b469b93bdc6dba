//! Score-based primary selection (§4.5), shared by both per-episode
//! resolution and the offline maintenance sweep. A divergent
//! "oldest-first" tiebreak is intentionally not reproduced here.

use kairos_core::Entity;

/// Score a candidate: has embedding (+1000), has summary (+100), older
/// wins ties (`-created_at` as epoch seconds). The highest score wins.
fn score(entity: &Entity) -> (i64, i64, i64) {
    let embedding_bonus = if entity.has_embedding() { 1000 } else { 0 };
    let summary_bonus = if entity.has_summary() { 100 } else { 0 };
    let recency = -entity.created_at.timestamp();
    (embedding_bonus + summary_bonus, recency, 0)
}

/// Select the primary (canonical) member of a duplicate group by score.
///
/// Returns `None` for an empty group. A singleton group returns its only
/// member unchanged.
pub fn select_primary(members: &[Entity]) -> Option<&Entity> {
    members.iter().max_by_key(|e| score(e))
}
