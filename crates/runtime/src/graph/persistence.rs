//! Line-delimited persistence for session graphs
//!
//! One record per line, `{"type":"entity",…}` or `{"type":"relation",…}`,
//! written atomically (temp file + rename) after each mutation batch.
//! Layout: `<base>/<session_id>/fsm-state-graph.json`.

use super::{Entity, Relation, SessionGraph};
use crate::types::GraphError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const GRAPH_FILE: &str = "fsm-state-graph.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GraphRecord {
    Entity {
        #[serde(flatten)]
        entity: Entity,
    },
    Relation {
        #[serde(flatten)]
        relation: Relation,
    },
}

fn graph_path(base: &Path, session_id: &str) -> PathBuf {
    base.join(sanitize_component(session_id)).join(GRAPH_FILE)
}

/// Session ids become directory names; strip anything path-hostile.
fn sanitize_component(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write the whole graph for one session, atomically.
pub fn save_graph(base: &Path, session_id: &str, graph: &SessionGraph) -> Result<(), GraphError> {
    let path = graph_path(base, session_id);
    let dir = path.parent().ok_or_else(|| {
        GraphError::Persistence(format!("no parent directory for {}", path.display()))
    })?;
    fs::create_dir_all(dir).map_err(|e| GraphError::Persistence(e.to_string()))?;

    let mut lines = String::new();
    for entity in &graph.entities {
        let record = GraphRecord::Entity {
            entity: entity.clone(),
        };
        lines.push_str(
            &serde_json::to_string(&record).map_err(|e| GraphError::Persistence(e.to_string()))?,
        );
        lines.push('\n');
    }
    for relation in &graph.relations {
        let record = GraphRecord::Relation {
            relation: relation.clone(),
        };
        lines.push_str(
            &serde_json::to_string(&record).map_err(|e| GraphError::Persistence(e.to_string()))?,
        );
        lines.push('\n');
    }

    let tmp = path.with_extension("json.tmp");
    {
        let mut file =
            fs::File::create(&tmp).map_err(|e| GraphError::Persistence(e.to_string()))?;
        file.write_all(lines.as_bytes())
            .map_err(|e| GraphError::Persistence(e.to_string()))?;
    }
    fs::rename(&tmp, &path).map_err(|e| GraphError::Persistence(e.to_string()))?;
    Ok(())
}

/// Load a persisted graph, tolerating an absent file.
pub fn load_graph(base: &Path, session_id: &str) -> Result<Option<SessionGraph>, GraphError> {
    let path = graph_path(base, session_id);
    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GraphError::Persistence(e.to_string())),
    };

    let mut graph = SessionGraph::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: GraphRecord = serde_json::from_str(line)
            .map_err(|e| GraphError::Persistence(format!("corrupt record: {e}")))?;
        match record {
            GraphRecord::Entity { entity } => graph.entities.push(entity),
            GraphRecord::Relation { relation } => graph.relations.push(relation),
        }
    }
    Ok(Some(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityType, RelationType};

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let graph = SessionGraph {
            entities: vec![
                Entity::new("S", EntityType::Session)
                    .with_observations(vec!["objective: test".to_string()]),
                Entity::new("S_phase_INIT", EntityType::Phase),
            ],
            relations: vec![Relation::new(
                "S",
                "S_phase_INIT",
                RelationType::Contains,
            )],
        };

        save_graph(dir.path(), "S", &graph).unwrap();
        let loaded = load_graph(dir.path(), "S").unwrap().unwrap();
        assert_eq!(loaded.entities, graph.entities);
        assert_eq!(loaded.relations, graph.relations);
    }

    #[test]
    fn file_is_line_delimited_with_type_tags() {
        let dir = tempfile::tempdir().unwrap();
        let graph = SessionGraph {
            entities: vec![Entity::new("S", EntityType::Session)],
            relations: vec![Relation::new("S", "S", RelationType::Tracks)],
        };
        save_graph(dir.path(), "S", &graph).unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("S").join(GRAPH_FILE)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"type\":\"entity\""));
        assert!(lines[1].contains("\"type\":\"relation\""));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_graph(dir.path(), "nope").unwrap().is_none());
    }

    #[test]
    fn hostile_session_ids_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let graph = SessionGraph::default();
        save_graph(dir.path(), "../escape", &graph).unwrap();
        assert!(dir.path().join("___escape").exists());
    }
}
