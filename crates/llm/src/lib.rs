pub mod embedding;
pub mod judge;
pub mod provider;

pub use embedding::{EmbeddingCache, EmbeddingError, Embedder};
pub use judge::{judge_duplicates, DedupCandidateSet, DedupDecision};
pub use provider::{LlmError, LlmProvider, Message, Role};
