//! In-memory reference `GraphDriver`, used by tests and by any crate that
//! wants a working graph without a live Neo4j/FalkorDB instance.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use kairos_core::{Edge, EdgeId, Entity, EntityId};

use crate::constraints::GraphBackend;
use crate::driver::{GraphDriver, GraphStats};
use crate::error::GraphError;

#[derive(Default)]
struct State {
    entities: HashMap<EntityId, Entity>,
    name_index: HashMap<(String, String), EntityId>,
    edges: HashMap<EdgeId, Edge>,
    outgoing: HashMap<EntityId, Vec<EdgeId>>,
    incoming: HashMap<EntityId, Vec<EdgeId>>,
}

#[derive(Default)]
pub struct InMemoryGraphDriver {
    state: RwLock<State>,
}

impl InMemoryGraphDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphDriver for InMemoryGraphDriver {
    async fn upsert_entity(&self, entity: Entity) -> Result<Entity, GraphError> {
        let mut state = self.state.write().unwrap();
        let key = (entity.tenant.clone(), entity.name.clone());
        state.name_index.insert(key, entity.id);
        state.entities.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>, GraphError> {
        Ok(self.state.read().unwrap().entities.get(&id).cloned())
    }

    async fn find_entity_by_name(&self, tenant: &str, name: &str) -> Result<Option<Entity>, GraphError> {
        let state = self.state.read().unwrap();
        let key = (tenant.to_string(), name.to_string());
        Ok(state.name_index.get(&key).and_then(|id| state.entities.get(id)).cloned())
    }

    async fn list_entities(&self, tenant: &str) -> Result<Vec<Entity>, GraphError> {
        let state = self.state.read().unwrap();
        Ok(state.entities.values().filter(|e| e.tenant == tenant).cloned().collect())
    }

    async fn delete_entity(&self, id: EntityId) -> Result<(), GraphError> {
        let mut state = self.state.write().unwrap();
        let entity = state
            .entities
            .remove(&id)
            .ok_or_else(|| GraphError::EntityNotFound(id.to_string()))?;
        state.name_index.remove(&(entity.tenant, entity.name));
        state.outgoing.remove(&id);
        state.incoming.remove(&id);
        Ok(())
    }

    async fn upsert_edge(&self, edge: Edge) -> Result<Edge, GraphError> {
        let mut state = self.state.write().unwrap();
        if !state.edges.contains_key(&edge.id) {
            state.outgoing.entry(edge.source_id).or_default().push(edge.id);
            state.incoming.entry(edge.target_id).or_default().push(edge.id);
        }
        state.edges.insert(edge.id, edge.clone());
        Ok(edge)
    }

    async fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>, GraphError> {
        Ok(self.state.read().unwrap().edges.get(&id).cloned())
    }

    async fn outgoing_edges(&self, entity_id: EntityId) -> Result<Vec<Edge>, GraphError> {
        let state = self.state.read().unwrap();
        Ok(state
            .outgoing
            .get(&entity_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.edges.get(id).cloned())
            .collect())
    }

    async fn incoming_edges(&self, entity_id: EntityId) -> Result<Vec<Edge>, GraphError> {
        let state = self.state.read().unwrap();
        Ok(state
            .incoming
            .get(&entity_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.edges.get(id).cloned())
            .collect())
    }

    async fn delete_edge(&self, id: EdgeId) -> Result<(), GraphError> {
        let mut state = self.state.write().unwrap();
        let edge = state.edges.remove(&id).ok_or_else(|| GraphError::EdgeNotFound(id.to_string()))?;
        if let Some(v) = state.outgoing.get_mut(&edge.source_id) {
            v.retain(|e| *e != id);
        }
        if let Some(v) = state.incoming.get_mut(&edge.target_id) {
            v.retain(|e| *e != id);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats, GraphError> {
        let state = self.state.read().unwrap();
        Ok(GraphStats { entity_count: state.entities.len(), edge_count: state.edges.len() })
    }

    async fn ensure_constraints(&self, _backend: GraphBackend, _graph_key: &str) -> Result<(), GraphError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kairos_core::Entity;
    use std::collections::HashMap as Map;
    use uuid::Uuid;

    fn entity(tenant: &str, name: &str) -> Entity {
        Entity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            tenant: tenant.to_string(),
            labels: vec![],
            summary: None,
            name_embedding: None,
            attributes: Map::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            centrality: Default::default(),
        }
    }

    #[tokio::test]
    async fn upsert_then_find_by_name_round_trips() {
        let driver = InMemoryGraphDriver::new();
        let e = entity("acme", "Widget");
        driver.upsert_entity(e.clone()).await.unwrap();
        let found = driver.find_entity_by_name("acme", "Widget").await.unwrap();
        assert_eq!(found.unwrap().id, e.id);
    }

    #[tokio::test]
    async fn name_lookup_is_tenant_scoped() {
        let driver = InMemoryGraphDriver::new();
        driver.upsert_entity(entity("acme", "Widget")).await.unwrap();
        assert!(driver.find_entity_by_name("other-tenant", "Widget").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_entity_removes_name_index_entry() {
        let driver = InMemoryGraphDriver::new();
        let e = entity("acme", "Widget");
        driver.upsert_entity(e.clone()).await.unwrap();
        driver.delete_entity(e.id).await.unwrap();
        assert!(driver.find_entity_by_name("acme", "Widget").await.unwrap().is_none());
        assert!(driver.get_entity(e.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn edge_visible_from_both_endpoints() {
        let driver = InMemoryGraphDriver::new();
        let a = entity("acme", "A");
        let b = entity("acme", "B");
        driver.upsert_entity(a.clone()).await.unwrap();
        driver.upsert_entity(b.clone()).await.unwrap();
        let edge = Edge::new(Uuid::new_v4(), a.id, b.id, "acme", Some("connects".to_string()));
        driver.upsert_edge(edge.clone()).await.unwrap();

        let out = driver.outgoing_edges(a.id).await.unwrap();
        assert_eq!(out.len(), 1);
        let inc = driver.incoming_edges(b.id).await.unwrap();
        assert_eq!(inc.len(), 1);
        assert_eq!(out[0].id, inc[0].id);
    }

    #[tokio::test]
    async fn stats_reflects_entity_and_edge_counts() {
        let driver = InMemoryGraphDriver::new();
        driver.upsert_entity(entity("acme", "A")).await.unwrap();
        driver.upsert_entity(entity("acme", "B")).await.unwrap();
        let stats = driver.stats().await.unwrap();
        assert_eq!(stats.entity_count, 2);
        assert_eq!(stats.edge_count, 0);
    }
}
