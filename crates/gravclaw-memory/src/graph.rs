//! Knowledge graph: entities keyed by exact name, directed labeled edges.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::debug;

use crate::store::now_timestamp;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum EntityKind {
    Person,
    Project,
    Place,
    Organization,
    Tool,
    #[default]
    #[serde(other)]
    Other,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "Person",
            EntityKind::Project => "Project",
            EntityKind::Place => "Place",
            EntityKind::Organization => "Organization",
            EntityKind::Tool => "Tool",
            EntityKind::Other => "Other",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExtractedRelation {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Model output for one message.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtractedGraph {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelation>,
}

impl ExtractedGraph {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphWrite {
    pub entities_created: usize,
    pub relationships_created: usize,
}

/// Return the id for `entity.name`, inserting it when absent. A row added
/// by a concurrent writer between the lookup and the insert is reused.
pub fn resolve_entity(conn: &Connection, entity: &ExtractedEntity) -> rusqlite::Result<(i64, bool)> {
    if let Some(id) = find_entity(conn, &entity.name)? {
        return Ok((id, false));
    }

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO entities (name, type, description, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            entity.name,
            entity.kind.as_str(),
            entity.description,
            now_timestamp()
        ],
    )?;

    match find_entity(conn, &entity.name)? {
        Some(id) => Ok((id, inserted > 0)),
        None => Err(rusqlite::Error::QueryReturnedNoRows),
    }
}

pub fn find_entity(conn: &Connection, name: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM entities WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

/// Write a whole extraction. Edges whose endpoints did not resolve are
/// dropped.
pub fn apply_graph(conn: &Connection, graph: &ExtractedGraph) -> rusqlite::Result<GraphWrite> {
    let mut ids: HashMap<&str, i64> = HashMap::new();
    let mut write = GraphWrite::default();

    for entity in &graph.entities {
        if entity.name.trim().is_empty() {
            continue;
        }
        let (id, created) = resolve_entity(conn, entity)?;
        if created {
            debug!(name = %entity.name, kind = entity.kind.as_str(), "New entity");
            write.entities_created += 1;
        }
        ids.insert(entity.name.as_str(), id);
    }

    for rel in &graph.relationships {
        let (Some(&subject_id), Some(&object_id)) =
            (ids.get(rel.subject.as_str()), ids.get(rel.object.as_str()))
        else {
            debug!(subject = %rel.subject, object = %rel.object, "Dropping edge with unresolved endpoint");
            continue;
        };
        conn.execute(
            "INSERT INTO relationships (subject_id, predicate, object_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![subject_id, rel.predicate, object_id, now_timestamp()],
        )?;
        debug!(subject = %rel.subject, predicate = %rel.predicate, object = %rel.object, "New link");
        write.relationships_created += 1;
    }

    Ok(write)
}

/// Outgoing edges of an entity as `(predicate, object name)`.
pub fn neighbors(conn: &Connection, name: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT r.predicate, o.name
         FROM relationships r
         JOIN entities s ON s.id = r.subject_id
         JOIN entities o ON o.id = r.object_id
         WHERE s.name = ?1
         ORDER BY r.id",
    )?;
    let rows = stmt.query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
