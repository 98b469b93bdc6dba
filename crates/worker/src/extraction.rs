//! LLM-backed entity/edge extraction from raw episode content (§4.7.1
//! "episode" dispatch: "LLM extraction + dedup + merge").
//!
//! The extraction call is an opaque RPC like [`kairos_llm::judge`]'s dedup
//! judgment: a JSON-only prompt, parsed defensively. A task payload may
//! also carry pre-extracted `entities`/`edges` arrays directly (producers
//! that already ran extraction upstream), in which case no LLM call is made.

use kairos_dedup::ExtractedCandidate;
use kairos_llm::{LlmError, LlmProvider, Message, Role};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ExtractedEdge {
    pub source_name: String,
    pub target_name: String,
    pub relation: Option<String>,
    pub fact: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedGraph {
    pub entities: Vec<ExtractedCandidate>,
    pub edges: Vec<ExtractedEdge>,
}

#[derive(Deserialize)]
struct RawEntity {
    name: String,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct RawEdge {
    source: String,
    target: String,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default)]
    fact: Option<String>,
}

#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    edges: Vec<RawEdge>,
}

/// Ask the LLM to extract entities and relationships from `content`.
/// On a parse failure, returns an empty graph with a warning rather than
/// failing the whole episode — a malformed extraction shouldn't DLQ a task
/// the retry loop can't fix by retrying the same content.
pub async fn extract_from_content(
    provider: &dyn LlmProvider,
    tenant: &str,
    content: &str,
) -> Result<ExtractedGraph, LlmError> {
    let prompt = format!(
        "Extract entities and relationships from the following text. \
         Respond with strict JSON: {{\"entities\": [{{\"name\": str, \"labels\": [str]}}], \
         \"edges\": [{{\"source\": str, \"target\": str, \"relation\": str, \"fact\": str}}]}}.\n\n\
         Text:\n{content}"
    );
    let messages = vec![
        Message { role: Role::System, content: "You extract knowledge graph triples. Respond with JSON only.".to_string() },
        Message { role: Role::User, content: prompt },
    ];

    let raw = provider.complete(messages, 0.0, 2048).await?;
    let parsed: RawExtraction = match serde_json::from_str(&raw) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(tenant, error = %e, "episode extraction response did not parse, treating as empty");
            return Ok(ExtractedGraph::default());
        }
    };

    Ok(ExtractedGraph {
        entities: parsed
            .entities
            .into_iter()
            .map(|e| ExtractedCandidate { name: e.name, tenant: tenant.to_string(), labels: e.labels, embedding: None })
            .collect(),
        edges: parsed
            .edges
            .into_iter()
            .map(|e| ExtractedEdge { source_name: e.source, target_name: e.target, relation: e.relation, fact: e.fact })
            .collect(),
    })
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
        async fn complete(&self, _messages: Vec<Message>, _temperature: f32, _max_tokens: u32) -> Result<String, LlmError> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn parses_entities_and_edges() {
        let provider = StubProvider {
            response: r#"{"entities":[{"name":"Alice","labels":["Person"]}],"edges":[{"source":"Alice","target":"Acme","relation":"works_at","fact":"Alice works at Acme"}]}"#.to_string(),
        };
        let graph = extract_from_content(&provider, "t1", "Alice works at Acme.").await.unwrap();
        assert_eq!(graph.entities.len(), 1);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].relation.as_deref(), Some("works_at"));
    }

    #[tokio::test]
    async fn malformed_response_yields_empty_graph() {
        let provider = StubProvider { response: "not json".to_string() };
        let graph = extract_from_content(&provider, "t1", "anything").await.unwrap();
        assert!(graph.entities.is_empty());
        assert!(graph.edges.is_empty());
    }
}
