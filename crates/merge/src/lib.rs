pub mod centrality;
pub mod edge_policy;
pub mod engine;
pub mod error;
pub mod policy;

pub use centrality::{local_fallback, CentralityClient};
pub use edge_policy::merge_edge_properties;
pub use engine::{merge, Finalization, MergeRequest, MergeStats, AUDIT_EDGE_NAME};
pub use error::MergeError;
pub use policy::{
    centrality_score, completeness_score, select_primary, ConflictResolution, FieldRule,
};
