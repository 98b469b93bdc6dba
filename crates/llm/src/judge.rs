//! Structured dedup-judgment calls (§4.5 step 4).
//!
//! The dedup engine hands the LLM a node plus a short list of candidate
//! matches and asks it to decide, per node, whether it duplicates one of
//! them. The provider is an opaque RPC (see [`crate::provider::LlmProvider`]);
//! this module just defines the expected request/response shape and does
//! the JSON parsing, so `kairos-dedup` never has to.

use serde::{Deserialize, Serialize};

use crate::provider::{LlmError, LlmProvider, Message, Role};

/// One node awaiting a duplicate decision, with its candidate neighbors.
#[derive(Debug, Clone, Serialize)]
pub struct DedupCandidateSet {
    pub node_name: String,
    /// Candidate neighbor names, in the order returned by the hybrid search.
    pub candidates: Vec<String>,
}

/// The LLM's decision for one node: `duplicate_idx` indexes into that
/// node's `candidates` (`None` means "not a duplicate of any candidate").
#[derive(Debug, Clone, Deserialize)]
pub struct DedupDecision {
    pub node_name: String,
    pub duplicate_idx: Option<usize>,
    #[serde(default)]
    pub duplicates: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct DedupResponse {
    decisions: Vec<DedupDecision>,
}

/// Ask the LLM to judge each node in `sets` against its own candidate list.
///
/// Invalid indices in the response (out of range for that node's
/// candidate list) are dropped with a warning rather than failing the
/// whole call, logging a warning instead.
pub async fn judge_duplicates(
    provider: &dyn LlmProvider,
    sets: &[DedupCandidateSet],
) -> Result<Vec<DedupDecision>, LlmError> {
    if sets.is_empty() {
        return Ok(Vec::new());
    }

    let prompt = build_prompt(sets);
    let messages = vec![
        Message {
            role: Role::System,
            content: "You resolve entity deduplication. Respond with strict JSON only.".to_string(),
        },
        Message { role: Role::User, content: prompt },
    ];

    let raw = provider.complete(messages, 0.0, 1024).await?;
    let parsed: DedupResponse =
        serde_json::from_str(raw.trim()).map_err(|e| LlmError::ParseError(e.to_string()))?;

    let mut decisions = Vec::with_capacity(parsed.decisions.len());
    for decision in parsed.decisions {
        let Some(set) = sets.iter().find(|s| s.node_name == decision.node_name) else {
            tracing::warn!(node = %decision.node_name, "dedup judge response for unknown node, ignoring");
            continue;
        };
        let mut cleaned = decision;
        if let Some(idx) = cleaned.duplicate_idx {
            if idx >= set.candidates.len() {
                tracing::warn!(node = %cleaned.node_name, idx, "dedup judge returned out-of-range duplicate_idx, ignoring");
                cleaned.duplicate_idx = None;
            }
        }
        cleaned.duplicates.retain(|idx| {
            let in_range = *idx < set.candidates.len();
            if !in_range {
                tracing::warn!(node = %cleaned.node_name, idx, "dedup judge returned out-of-range duplicate index, ignoring");
            }
            in_range
        });
        decisions.push(cleaned);
    }

    Ok(decisions)
}

fn build_prompt(sets: &[DedupCandidateSet]) -> String {
    let payload = serde_json::json!({
        "nodes": sets.iter().map(|s| serde_json::json!({
            "name": s.node_name,
            "candidates": s.candidates,
        })).collect::<Vec<_>>(),
        "instructions": "For each node, return duplicate_idx (index into its candidates, or null) \
                          and duplicates (all matching indices). Respond as {\"decisions\": [...]}.",
    });
    payload.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubProvider {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn complete(&self, _messages: Vec<Message>, _t: f32, _m: u32) -> Result<String, LlmError> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let provider = StubProvider { response: String::new() };
        let result = judge_duplicates(&provider, &[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn valid_response_parses() {
        let provider = StubProvider {
            response: r#"{"decisions":[{"node_name":"acme","duplicate_idx":0,"duplicates":[0]}]}"#.to_string(),
        };
        let sets = vec![DedupCandidateSet { node_name: "acme".to_string(), candidates: vec!["Acme Corp".to_string()] }];
        let result = judge_duplicates(&provider, &sets).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].duplicate_idx, Some(0));
    }

    #[tokio::test]
    async fn out_of_range_index_is_dropped_with_warning() {
        let provider = StubProvider {
            response: r#"{"decisions":[{"node_name":"acme","duplicate_idx":5,"duplicates":[5]}]}"#.to_string(),
        };
        let sets = vec![DedupCandidateSet { node_name: "acme".to_string(), candidates: vec!["Acme Corp".to_string()] }];
        let result = judge_duplicates(&provider, &sets).await.unwrap();
        assert_eq!(result[0].duplicate_idx, None);
        assert!(result[0].duplicates.is_empty());
    }

    #[tokio::test]
    async fn unknown_node_in_response_is_ignored() {
        let provider = StubProvider {
            response: r#"{"decisions":[{"node_name":"ghost","duplicate_idx":null,"duplicates":[]}]}"#.to_string(),
        };
        let result = judge_duplicates(&provider, &[DedupCandidateSet { node_name: "acme".to_string(), candidates: vec![] }])
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
