//! Per-backend constraint statement builders (§6, §11).
//!
//! The two supported backends agree on which fields must be unique/present
//! but disagree on syntax: Neo4j uses declarative `CREATE CONSTRAINT`,
//! FalkorDB uses `GRAPH.CONSTRAINT CREATE`. These are fixed statement
//! lists, not a query builder — the graph query language itself stays out
//! of scope.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphBackend {
    Neo4j,
    FalkorDb,
    /// Reference driver used by tests; has no constraint statements of
    /// its own — uniqueness is enforced in-process instead.
    Memory,
}

impl fmt::Display for GraphBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphBackend::Neo4j => write!(f, "neo4j"),
            GraphBackend::FalkorDb => write!(f, "falkordb"),
            GraphBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for GraphBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neo4j" => Ok(GraphBackend::Neo4j),
            "falkordb" => Ok(GraphBackend::FalkorDb),
            "memory" => Ok(GraphBackend::Memory),
            other => Err(format!("unknown graph backend: {other}")),
        }
    }
}

/// Uniqueness constraints: entity/episode/community uuid uniqueness,
/// relationship uuid uniqueness for `RELATES_TO`/`HAS_MEMBER` (not
/// `MENTIONS` — episodes may legitimately mention the same entity more
/// than once), and the `(name, tenant)` composite that is this crate's
/// actual dedup backstop.
pub fn unique_constraints(backend: GraphBackend, graph_key: &str) -> Vec<String> {
    match backend {
        GraphBackend::FalkorDb => vec![
            format!("GRAPH.CONSTRAINT CREATE {graph_key} UNIQUE NODE Entity PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} UNIQUE NODE Episodic PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} UNIQUE NODE Community PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} UNIQUE RELATIONSHIP RELATES_TO PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} UNIQUE RELATIONSHIP HAS_MEMBER PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} UNIQUE NODE Entity PROPERTIES 2 name group_id"),
        ],
        GraphBackend::Neo4j => vec![
            "CREATE CONSTRAINT entity_uuid_unique IF NOT EXISTS FOR (n:Entity) REQUIRE n.uuid IS UNIQUE".into(),
            "CREATE CONSTRAINT episodic_uuid_unique IF NOT EXISTS FOR (n:Episodic) REQUIRE n.uuid IS UNIQUE".into(),
            "CREATE CONSTRAINT community_uuid_unique IF NOT EXISTS FOR (n:Community) REQUIRE n.uuid IS UNIQUE".into(),
            "CREATE CONSTRAINT relates_to_uuid_unique IF NOT EXISTS FOR ()-[e:RELATES_TO]-() REQUIRE e.uuid IS UNIQUE".into(),
            "CREATE CONSTRAINT has_member_uuid_unique IF NOT EXISTS FOR ()-[e:HAS_MEMBER]-() REQUIRE e.uuid IS UNIQUE".into(),
            "CREATE CONSTRAINT entity_name_group_unique IF NOT EXISTS FOR (n:Entity) REQUIRE (n.name, n.group_id) IS UNIQUE".into(),
        ],
        GraphBackend::Memory => Vec::new(),
    }
}

/// Existence (NOT NULL / MANDATORY) constraints on the identifying and
/// tenant-scoping fields.
pub fn existence_constraints(backend: GraphBackend, graph_key: &str) -> Vec<String> {
    match backend {
        GraphBackend::FalkorDb => vec![
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY NODE Entity PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY NODE Entity PROPERTIES 1 name"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY NODE Entity PROPERTIES 1 group_id"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY NODE Episodic PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY NODE Episodic PROPERTIES 1 group_id"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY NODE Community PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY RELATIONSHIP RELATES_TO PROPERTIES 1 uuid"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY RELATIONSHIP RELATES_TO PROPERTIES 1 group_id"),
            format!("GRAPH.CONSTRAINT CREATE {graph_key} MANDATORY RELATIONSHIP HAS_MEMBER PROPERTIES 1 uuid"),
        ],
        GraphBackend::Neo4j => vec![
            "CREATE CONSTRAINT entity_uuid_exists IF NOT EXISTS FOR (n:Entity) REQUIRE n.uuid IS NOT NULL".into(),
            "CREATE CONSTRAINT entity_name_exists IF NOT EXISTS FOR (n:Entity) REQUIRE n.name IS NOT NULL".into(),
            "CREATE CONSTRAINT entity_group_id_exists IF NOT EXISTS FOR (n:Entity) REQUIRE n.group_id IS NOT NULL".into(),
            "CREATE CONSTRAINT episodic_uuid_exists IF NOT EXISTS FOR (n:Episodic) REQUIRE n.uuid IS NOT NULL".into(),
            "CREATE CONSTRAINT episodic_group_id_exists IF NOT EXISTS FOR (n:Episodic) REQUIRE n.group_id IS NOT NULL".into(),
            "CREATE CONSTRAINT community_uuid_exists IF NOT EXISTS FOR (n:Community) REQUIRE n.uuid IS NOT NULL".into(),
            "CREATE CONSTRAINT relates_to_uuid_exists IF NOT EXISTS FOR ()-[e:RELATES_TO]-() REQUIRE e.uuid IS NOT NULL".into(),
            "CREATE CONSTRAINT relates_to_group_id_exists IF NOT EXISTS FOR ()-[e:RELATES_TO]-() REQUIRE e.group_id IS NOT NULL".into(),
            "CREATE CONSTRAINT has_member_uuid_exists IF NOT EXISTS FOR ()-[e:HAS_MEMBER]-() REQUIRE e.uuid IS NOT NULL".into(),
        ],
        GraphBackend::Memory => Vec::new(),
    }
}

pub fn all_constraints(backend: GraphBackend, graph_key: &str) -> Vec<String> {
    let mut all = unique_constraints(backend, graph_key);
    all.extend(existence_constraints(backend, graph_key));
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falkordb_has_no_mentions_uuid_constraint() {
        let constraints = all_constraints(GraphBackend::FalkorDb, "default_graph");
        assert!(!constraints.iter().any(|c| c.contains("MENTIONS")));
    }

    #[test]
    fn neo4j_name_group_constraint_is_composite() {
        let constraints = unique_constraints(GraphBackend::Neo4j, "default_graph");
        assert!(constraints.iter().any(|c| c.contains("(n.name, n.group_id)")));
    }

    #[test]
    fn memory_backend_has_no_statements() {
        assert!(all_constraints(GraphBackend::Memory, "x").is_empty());
    }

    #[test]
    fn backend_round_trips_through_display_and_from_str() {
        for backend in [GraphBackend::Neo4j, GraphBackend::FalkorDb, GraphBackend::Memory] {
            let s = backend.to_string();
            assert_eq!(s.parse::<GraphBackend>().unwrap(), backend);
        }
    }
}
