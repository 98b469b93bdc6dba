#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("graph error: {0}")]
    Graph(#[from] kairos_graph::GraphError),
    #[error("llm error: {0}")]
    Llm(#[from] kairos_llm::LlmError),
}
