#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("graph error: {0}")]
    Graph(#[from] kairos_graph::GraphError),

    #[error("canonical entity {0} not found")]
    CanonicalNotFound(uuid::Uuid),

    #[error("duplicate entity {0} not found")]
    DuplicateNotFound(uuid::Uuid),

    #[error("cross-tenant merge of {duplicate_tenant} into {canonical_tenant} requires allow_cross_tenant_merge")]
    CrossTenantNotAllowed {
        canonical_tenant: String,
        duplicate_tenant: String,
    },
}
