//! Edge property merge policy (§4.6), applied when a transferred edge
//! collides with one that already exists between the same endpoint pair
//! and relation type.

use kairos_core::Edge;

/// Merge `incoming` into `existing` in place per the §4.6 rules:
/// `episodes` ordered union; `created_at`/`valid_at` take the min;
/// `invalid_at` takes the max; `fact`/`fact_embedding` keep existing
/// unless empty; `attributes` shallow-merge with existing winning key
/// conflicts; any other field keeps existing unless it is null/empty.
pub fn merge_edge_properties(existing: &mut Edge, incoming: &Edge) {
    for episode in &incoming.episodes {
        if !existing.episodes.contains(episode) {
            existing.episodes.push(*episode);
        }
    }

    existing.created_at = existing.created_at.min(incoming.created_at);
    existing.valid_at = existing.valid_at.min(incoming.valid_at);
    existing.invalid_at = match (existing.invalid_at, incoming.invalid_at) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    };

    if existing.fact.as_deref().map(str::trim).unwrap_or("").is_empty() {
        existing.fact = incoming.fact.clone();
    }
    if existing.fact_embedding.as_deref().map(<[f32]>::is_empty).unwrap_or(true) {
        existing.fact_embedding = incoming.fact_embedding.clone();
    }

    for (k, v) in &incoming.attributes {
        existing.attributes.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn edge(tenant: &str) -> Edge {
        Edge::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), tenant, Some("KNOWS".to_string()))
    }

    #[test]
    fn episodes_are_unioned_without_duplicates() {
        let e1 = Uuid::new_v4();
        let e2 = Uuid::new_v4();
        let mut existing = edge("t");
        existing.episodes = vec![e1];
        let mut incoming = edge("t");
        incoming.episodes = vec![e1, e2];

        merge_edge_properties(&mut existing, &incoming);
        assert_eq!(existing.episodes, vec![e1, e2]);
    }

    #[test]
    fn created_at_takes_the_minimum() {
        let mut existing = edge("t");
        let mut incoming = edge("t");
        incoming.created_at = existing.created_at - Duration::days(1);
        merge_edge_properties(&mut existing, &incoming);
        assert_eq!(existing.created_at, incoming.created_at);
    }

    #[test]
    fn invalid_at_takes_the_maximum() {
        let mut existing = edge("t");
        existing.invalid_at = Some(existing.valid_at + Duration::days(1));
        let mut incoming = edge("t");
        incoming.invalid_at = Some(incoming.valid_at + Duration::days(5));
        merge_edge_properties(&mut existing, &incoming);
        assert_eq!(existing.invalid_at, incoming.invalid_at);
    }

    #[test]
    fn fact_keeps_existing_unless_empty() {
        let mut existing = edge("t");
        existing.fact = Some("existing fact".to_string());
        let mut incoming = edge("t");
        incoming.fact = Some("incoming fact".to_string());
        merge_edge_properties(&mut existing, &incoming);
        assert_eq!(existing.fact.as_deref(), Some("existing fact"));

        let mut empty_existing = edge("t");
        merge_edge_properties(&mut empty_existing, &incoming);
        assert_eq!(empty_existing.fact.as_deref(), Some("incoming fact"));
    }

    #[test]
    fn attributes_shallow_merge_existing_wins() {
        let mut existing = edge("t");
        existing.attributes.insert("k".to_string(), serde_json::json!("existing"));
        let mut incoming = edge("t");
        incoming.attributes.insert("k".to_string(), serde_json::json!("incoming"));
        incoming.attributes.insert("other".to_string(), serde_json::json!(1));
        merge_edge_properties(&mut existing, &incoming);
        assert_eq!(existing.attributes.get("k"), Some(&serde_json::json!("existing")));
        assert_eq!(existing.attributes.get("other"), Some(&serde_json::json!(1)));
    }
}
