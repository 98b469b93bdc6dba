//! Narrow storage trait the dedup/merge/validation engines build on.
//!
//! A tenant-scoped `Entity`/`Edge` property graph, with the lookups
//! the dedup/merge/validation engines actually need: exact-name
//! resolution within a tenant, and
//! deletion (the append-only teacher store never deleted anything).

use async_trait::async_trait;
use kairos_core::{Edge, EdgeId, Entity, EntityId};

use crate::constraints::GraphBackend;
use crate::error::GraphError;

#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub entity_count: usize,
    pub edge_count: usize,
}

#[async_trait]
pub trait GraphDriver: Send + Sync {
    async fn upsert_entity(&self, entity: Entity) -> Result<Entity, GraphError>;

    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>, GraphError>;

    /// Exact-match lookup by normalized name within a tenant — the
    /// first phase of dedup resolution (§4.5) and the backstop the
    /// `(name, group_id)` uniqueness constraint enforces at the
    /// database level.
    async fn find_entity_by_name(&self, tenant: &str, name: &str) -> Result<Option<Entity>, GraphError>;

    async fn list_entities(&self, tenant: &str) -> Result<Vec<Entity>, GraphError>;

    async fn delete_entity(&self, id: EntityId) -> Result<(), GraphError>;

    async fn upsert_edge(&self, edge: Edge) -> Result<Edge, GraphError>;

    async fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>, GraphError>;

    async fn outgoing_edges(&self, entity_id: EntityId) -> Result<Vec<Edge>, GraphError>;

    async fn incoming_edges(&self, entity_id: EntityId) -> Result<Vec<Edge>, GraphError>;

    async fn delete_edge(&self, id: EdgeId) -> Result<(), GraphError>;

    async fn stats(&self) -> Result<GraphStats, GraphError>;

    /// Applies this backend's fixed constraint statements (§11). The
    /// in-memory driver is a no-op since `GraphBackend::Memory` carries
    /// no statements.
    async fn ensure_constraints(&self, backend: GraphBackend, graph_key: &str) -> Result<(), GraphError>;
}
