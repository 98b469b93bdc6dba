//! Post-merge centrality refresh (§4.6 step 6).
//!
//! The preferred path calls out to the external centrality service's
//! single-node endpoint; on failure this falls back to a conservative,
//! explicitly best-effort local approximation from the node's degree.

use async_trait::async_trait;
use kairos_core::{Centrality, EntityId};

#[async_trait]
pub trait CentralityClient: Send + Sync {
    /// Request a centrality recompute for one node. Returns `true` if the
    /// service accepted the request.
    async fn update_node(&self, id: EntityId) -> bool;

    /// Batch variant used by the worker's fire-and-forget path (§4.7.1).
    /// Returns the number of nodes the service accepted.
    async fn update_nodes(&self, ids: &[EntityId]) -> usize;
}

/// Best-effort local approximation used when the centrality service call
/// fails: `degree ← min(1, deg/10)`,
/// with ad-hoc PageRank/betweenness proxies, all clamped to `[0, 1]`.
/// Any future real computation must preserve that clamp.
pub fn local_fallback(degree_count: u32) -> Centrality {
    let degree = (degree_count as f64 / 10.0).min(1.0);
    let pagerank = (0.15 + 0.85 * (degree_count as f64 / 100.0)).clamp(0.0, 1.0);
    let betweenness = (degree_count as f64 / 100.0).min(1.0);
    Centrality {
        degree,
        pagerank,
        betweenness,
        eigenvector: degree,
        importance: (degree + pagerank) / 2.0,
    }
    .clamped()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_degree_yields_baseline_pagerank() {
        let c = local_fallback(0);
        assert_eq!(c.degree, 0.0);
        assert!((c.pagerank - 0.15).abs() < 1e-9);
    }

    #[test]
    fn high_degree_clamps_to_one() {
        let c = local_fallback(1000);
        assert!(c.in_bounds());
        assert_eq!(c.degree, 1.0);
        assert_eq!(c.pagerank, 1.0);
    }
}
