//! Per-session knowledge graph
//!
//! Name-keyed entities with typed directed relations, used to record
//! phases, tasks, transitions and observations for each session. No
//! back-pointers: cycles in the domain (session↔phase↔task) are
//! expressed purely through relations. Entities de-duplicate by name,
//! relations by (from, to, type), observations by exact string.

use crate::types::{GraphError, Phase, Role, TodoPriority, TodoStatus};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub mod persistence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Session,
    Phase,
    Task,
    Role,
    Api,
    Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub observations: Vec<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
            observations: Vec::new(),
        }
    }

    pub fn with_observations(mut self, observations: Vec<String>) -> Self {
        self.observations = observations;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    TransitionsTo,
    Spawns,
    DependsOn,
    Uses,
    Tracks,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub relation_type: RelationType,
}

impl Relation {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relation_type: RelationType,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation_type,
        }
    }
}

/// One session's graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionGraph {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl SessionGraph {
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.name == name)
    }

    /// Subgraph induced by the retained entity set: only relations
    /// whose both endpoints survive are kept.
    fn induced(&self, keep: impl Fn(&Entity) -> bool) -> SessionGraph {
        let entities: Vec<Entity> = self.entities.iter().filter(|e| keep(e)).cloned().collect();
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        let relations = self
            .relations
            .iter()
            .filter(|r| names.contains(&r.from.as_str()) && names.contains(&r.to.as_str()))
            .cloned()
            .collect();
        SessionGraph {
            entities,
            relations,
        }
    }
}

/// Store of all session graphs. Owns the graphs exclusively; the phase
/// engine and tool surface go through the operations below.
pub struct KnowledgeGraphStore {
    graphs: RwLock<HashMap<String, SessionGraph>>,
    base_dir: Option<PathBuf>,
}

impl KnowledgeGraphStore {
    /// In-memory store (test environments).
    pub fn in_memory() -> Self {
        Self {
            graphs: RwLock::new(HashMap::new()),
            base_dir: None,
        }
    }

    /// Store persisting each session under `base_dir/<session_id>/`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            graphs: RwLock::new(HashMap::new()),
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn from_session_dir(session_dir: Option<&str>) -> Self {
        match session_dir {
            Some(dir) => Self::with_base_dir(dir),
            None => Self::in_memory(),
        }
    }

    fn mutate<R>(
        &self,
        session_id: &str,
        op: impl FnOnce(&mut SessionGraph) -> R,
    ) -> Result<R, GraphError> {
        let mut graphs = self.graphs.write();
        let graph = self.load_or_default(&mut graphs, session_id);
        let out = op(graph);
        if let Some(dir) = &self.base_dir {
            persistence::save_graph(dir, session_id, graph)?;
        }
        Ok(out)
    }

    fn read<R>(&self, session_id: &str, op: impl FnOnce(&SessionGraph) -> R) -> R {
        let mut graphs = self.graphs.write();
        let graph = self.load_or_default(&mut graphs, session_id);
        op(graph)
    }

    /// Pull a session graph into memory, restoring a persisted one on
    /// first access.
    fn load_or_default<'a>(
        &self,
        graphs: &'a mut HashMap<String, SessionGraph>,
        session_id: &str,
    ) -> &'a mut SessionGraph {
        if !graphs.contains_key(session_id) {
            let restored = self
                .base_dir
                .as_ref()
                .and_then(|dir| persistence::load_graph(dir, session_id).ok().flatten())
                .unwrap_or_default();
            graphs.insert(session_id.to_string(), restored);
        }
        graphs.get_mut(session_id).expect("graph inserted above")
    }

    // -----------------------------------------------------------------
    // CRUD operations
    // -----------------------------------------------------------------

    /// Insert entities, skipping names already present. Returns the
    /// number actually created.
    pub fn create_entities(
        &self,
        session_id: &str,
        entities: Vec<Entity>,
    ) -> Result<usize, GraphError> {
        self.mutate(session_id, |graph| {
            let mut created = 0;
            for mut entity in entities {
                if graph.entity(&entity.name).is_some() {
                    continue;
                }
                entity.observations.dedup();
                graph.entities.push(entity);
                created += 1;
            }
            created
        })
    }

    /// Insert relations, skipping duplicates of (from, to, type).
    pub fn create_relations(
        &self,
        session_id: &str,
        relations: Vec<Relation>,
    ) -> Result<usize, GraphError> {
        self.mutate(session_id, |graph| {
            let mut created = 0;
            for relation in relations {
                if graph.relations.contains(&relation) {
                    continue;
                }
                graph.relations.push(relation);
                created += 1;
            }
            created
        })
    }

    /// Append observations to an entity, skipping exact duplicates.
    pub fn add_observations(
        &self,
        session_id: &str,
        entity_name: &str,
        observations: Vec<String>,
    ) -> Result<usize, GraphError> {
        self.mutate(session_id, |graph| {
            let Some(entity) = graph.entity_mut(entity_name) else {
                return Err(GraphError::EntityNotFound(entity_name.to_string()));
            };
            let mut added = 0;
            for obs in observations {
                if !entity.observations.contains(&obs) {
                    entity.observations.push(obs);
                    added += 1;
                }
            }
            Ok(added)
        })?
    }

    /// Remove entities by name; every relation referencing a removed
    /// entity goes with it.
    pub fn delete_entities(
        &self,
        session_id: &str,
        names: &[String],
    ) -> Result<usize, GraphError> {
        self.mutate(session_id, |graph| {
            let before = graph.entities.len();
            graph.entities.retain(|e| !names.contains(&e.name));
            graph
                .relations
                .retain(|r| !names.contains(&r.from) && !names.contains(&r.to));
            before - graph.entities.len()
        })
    }

    pub fn delete_observations(
        &self,
        session_id: &str,
        entity_name: &str,
        observations: &[String],
    ) -> Result<usize, GraphError> {
        self.mutate(session_id, |graph| {
            let Some(entity) = graph.entity_mut(entity_name) else {
                return Err(GraphError::EntityNotFound(entity_name.to_string()));
            };
            let before = entity.observations.len();
            entity.observations.retain(|o| !observations.contains(o));
            Ok(before - entity.observations.len())
        })?
    }

    pub fn delete_relations(
        &self,
        session_id: &str,
        relations: &[Relation],
    ) -> Result<usize, GraphError> {
        self.mutate(session_id, |graph| {
            let before = graph.relations.len();
            graph.relations.retain(|r| !relations.contains(r));
            before - graph.relations.len()
        })
    }

    pub fn read_graph(&self, session_id: &str) -> SessionGraph {
        self.read(session_id, SessionGraph::clone)
    }

    /// Case-insensitive match over name, type and observations,
    /// returning the induced subgraph of matching entities.
    pub fn search_nodes(&self, session_id: &str, query: &str) -> SessionGraph {
        let needle = query.to_lowercase();
        self.read(session_id, |graph| {
            graph.induced(|entity| {
                entity.name.to_lowercase().contains(&needle)
                    || format!("{:?}", entity.entity_type)
                        .to_lowercase()
                        .contains(&needle)
                    || entity
                        .observations
                        .iter()
                        .any(|o| o.to_lowercase().contains(&needle))
            })
        })
    }

    /// Induced subgraph of the named entities.
    pub fn open_nodes(&self, session_id: &str, names: &[String]) -> SessionGraph {
        self.read(session_id, |graph| {
            graph.induced(|entity| names.contains(&entity.name))
        })
    }

    // -----------------------------------------------------------------
    // Convenience operations used by the phase engine
    // -----------------------------------------------------------------

    /// Create the session entity with its objective and role recorded
    /// as observations.
    pub fn initialize_session(
        &self,
        session_id: &str,
        objective: &str,
        role: Role,
    ) -> Result<(), GraphError> {
        let entity = Entity::new(session_id, EntityType::Session).with_observations(vec![
            format!("objective: {objective}"),
            format!("role: {role}"),
            format!("initialized: {}", Utc::now().to_rfc3339()),
        ]);
        self.create_entities(session_id, vec![entity])?;
        Ok(())
    }

    /// Record one FSM edge: phase entities are created on demand and
    /// connected with a `transitions_to` relation.
    pub fn record_phase_transition(
        &self,
        session_id: &str,
        from: Phase,
        to: Phase,
    ) -> Result<(), GraphError> {
        let from_name = phase_entity_name(session_id, from);
        let to_name = phase_entity_name(session_id, to);
        self.create_entities(
            session_id,
            vec![
                Entity::new(&from_name, EntityType::Phase),
                Entity::new(&to_name, EntityType::Phase),
            ],
        )?;
        self.create_relations(
            session_id,
            vec![Relation::new(from_name, to_name, RelationType::TransitionsTo)],
        )?;
        Ok(())
    }

    /// Record a planned task as an entity contained by the session.
    pub fn record_task_creation(
        &self,
        session_id: &str,
        task_id: &str,
        content: &str,
        priority: TodoPriority,
    ) -> Result<(), GraphError> {
        let task_name = task_entity_name(session_id, task_id);
        let entity = Entity::new(&task_name, EntityType::Task).with_observations(vec![
            format!("content: {content}"),
            format!("priority: {}", serde_plain(&priority)),
        ]);
        self.create_entities(session_id, vec![entity])?;
        self.create_relations(
            session_id,
            vec![Relation::new(session_id, task_name, RelationType::Contains)],
        )?;
        Ok(())
    }

    /// Append a timestamped status observation to a task entity.
    pub fn update_task_status(
        &self,
        session_id: &str,
        task_id: &str,
        status: TodoStatus,
    ) -> Result<(), GraphError> {
        let task_name = task_entity_name(session_id, task_id);
        self.add_observations(
            session_id,
            &task_name,
            vec![format!(
                "status: {} at {}",
                serde_plain(&status),
                Utc::now().to_rfc3339()
            )],
        )?;
        Ok(())
    }

    /// Append an effectiveness sample to the session's performance
    /// entity, creating it (and its `tracks` relation) on first use.
    pub fn record_performance(
        &self,
        session_id: &str,
        effectiveness: f64,
    ) -> Result<(), GraphError> {
        let perf_name = format!("{session_id}_performance");
        self.create_entities(
            session_id,
            vec![Entity::new(&perf_name, EntityType::Performance)],
        )?;
        self.create_relations(
            session_id,
            vec![Relation::new(session_id, &perf_name, RelationType::Tracks)],
        )?;
        self.add_observations(
            session_id,
            &perf_name,
            vec![format!(
                "effectiveness: {effectiveness:.2} at {}",
                Utc::now().to_rfc3339()
            )],
        )?;
        Ok(())
    }
}

pub fn phase_entity_name(session_id: &str, phase: Phase) -> String {
    format!("{session_id}_phase_{phase}")
}

pub fn task_entity_name(session_id: &str, task_id: &str) -> String {
    format!("{session_id}_task_{task_id}")
}

/// Wire form of a serde enum without surrounding quotes.
fn serde_plain<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
