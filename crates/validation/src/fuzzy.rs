//! Fuzzy matching (§4.3.4): word-overlap + semantic combined similarity,
//! with configurable per-strategy thresholds and an exact-match boost.

use kairos_core::config::FuzzyConfig;

/// Word-overlap similarity: Jaccard index over underscore/whitespace-split
/// lowercase tokens.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: std::collections::HashSet<&str> =
        a.split(|c: char| c == '_' || c.is_whitespace()).filter(|t| !t.is_empty()).collect();
    let tokens_b: std::collections::HashSet<&str> =
        b.split(|c: char| c == '_' || c.is_whitespace()).filter(|t| !t.is_empty()).collect();

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Cosine similarity between two L2-normalized embeddings.
///
/// Vectors are normalized internally, so callers may pass raw embeddings.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Combined similarity: `0.3 * word_overlap + 0.7 * semantic`, boosted to
/// `1.0` on an exact word match when `boost_exact_match` is set.
pub fn combined_similarity(word_sim: f64, semantic_sim: f64, boost_exact_match: bool) -> f64 {
    if boost_exact_match && (word_sim - 1.0).abs() < f64::EPSILON {
        return 1.0;
    }
    0.3 * word_sim + 0.7 * semantic_sim
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityScores {
    pub word_overlap: f64,
    pub semantic: f64,
    pub combined: f64,
}

/// Score two normalized names (with optional embeddings) against each other.
pub fn score_names(
    normalized_a: &str,
    normalized_b: &str,
    embedding_a: Option<&[f32]>,
    embedding_b: Option<&[f32]>,
    config: &FuzzyConfig,
) -> SimilarityScores {
    let word = word_overlap(normalized_a, normalized_b);
    let semantic = match (embedding_a, embedding_b) {
        (Some(a), Some(b)) => cosine_similarity(a, b),
        _ => 0.0,
    };
    let combined = combined_similarity(word, semantic, config.boost_exact_match);
    SimilarityScores { word_overlap: word, semantic, combined }
}

/// Entity match decision: combined score must clear the configured threshold.
pub fn is_entity_match(scores: &SimilarityScores, config: &FuzzyConfig) -> bool {
    scores.combined >= config.combined_threshold
}

/// Edge match decision: requires the endpoint pair to already match, plus
/// the fact-text combined similarity clearing the edge threshold.
pub fn is_edge_match(endpoints_match: bool, fact_scores: &SimilarityScores, config: &FuzzyConfig) -> bool {
    endpoints_match && fact_scores.combined >= config.edge_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(combined_threshold: f64, edge_threshold: f64) -> FuzzyConfig {
        FuzzyConfig {
            strategy: "balanced".to_string(),
            word_overlap_threshold: 0.6,
            semantic_threshold: 0.75,
            combined_threshold,
            edge_threshold,
            boost_exact_match: true,
        }
    }

    #[test]
    fn word_overlap_identical_tokens_is_one() {
        assert_eq!(word_overlap("john_smith", "john_smith"), 1.0);
    }

    #[test]
    fn word_overlap_disjoint_is_zero() {
        assert_eq!(word_overlap("alpha", "beta"), 0.0);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn combined_similarity_boosts_exact_word_match() {
        let result = combined_similarity(1.0, 0.1, true);
        assert_eq!(result, 1.0);
    }

    #[test]
    fn combined_similarity_without_boost_uses_weighted_formula() {
        let result = combined_similarity(1.0, 0.0, false);
        assert!((result - 0.3).abs() < 1e-9);
    }

    #[test]
    fn entity_match_respects_threshold() {
        let config = test_config(0.8, 0.6);
        let scores = SimilarityScores { word_overlap: 0.9, semantic: 0.9, combined: 0.9 };
        assert!(is_entity_match(&scores, &config));
        let low_scores = SimilarityScores { word_overlap: 0.2, semantic: 0.2, combined: 0.2 };
        assert!(!is_entity_match(&low_scores, &config));
    }

    #[test]
    fn edge_match_requires_endpoints_and_threshold() {
        let config = test_config(0.8, 0.6);
        let fact_scores = SimilarityScores { word_overlap: 0.9, semantic: 0.9, combined: 0.9 };
        assert!(is_edge_match(true, &fact_scores, &config));
        assert!(!is_edge_match(false, &fact_scores, &config));
    }
}
