//! SQLite persistence.
//!
//! One connection behind an async mutex; every table the agent owns lives in
//! the same file. Opening runs schema init and a verification write, and any
//! failure there is fatal to startup.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::PersistenceError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    metadata    TEXT,
    is_pruned   INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_conversations_pruned ON conversations(is_pruned, timestamp);

CREATE TABLE IF NOT EXISTS facts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    content             TEXT NOT NULL,
    embedding           TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    source_message_id   INTEGER,
    type                TEXT NOT NULL DEFAULT 'chat_fact',
    metadata            TEXT
);
CREATE INDEX IF NOT EXISTS idx_facts_type ON facts(type);

CREATE TABLE IF NOT EXISTS summaries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    content         TEXT NOT NULL,
    last_pruned_id  INTEGER NOT NULL,
    timestamp       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    type        TEXT NOT NULL,
    description TEXT,
    metadata    TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  INTEGER NOT NULL REFERENCES entities(id),
    predicate   TEXT NOT NULL,
    object_id   INTEGER NOT NULL REFERENCES entities(id),
    metadata    TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS usage (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    model               TEXT NOT NULL,
    prompt_tokens       INTEGER NOT NULL,
    completion_tokens   INTEGER NOT NULL,
    total_tokens        INTEGER NOT NULL,
    cost_usd            REAL NOT NULL,
    timestamp           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workflows (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    status          TEXT NOT NULL,
    plan            TEXT NOT NULL,
    current_step    INTEGER NOT NULL DEFAULT 0,
    result          TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vectors (
    id          TEXT PRIMARY KEY,
    embedding   TEXT NOT NULL,
    metadata    TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS _health_check (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    checked_at  TEXT NOT NULL
);
"#;

/// Current UTC time as a sortable RFC 3339 string with microseconds.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Shared handle to the agent's database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PersistenceError::Verify(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|source| PersistenceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(PersistenceError::Schema)?;

        let db = Self::init(conn)?;
        info!(path = %path.display(), "Database ready");
        Ok(db)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().map_err(|source| PersistenceError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch(SCHEMA).map_err(PersistenceError::Schema)?;
        verify(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Round-trip check used by the status query.
    pub async fn ping(&self) -> bool {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }
}

/// Confirm the core table exists and the file is writable.
fn verify(conn: &Connection) -> Result<(), PersistenceError> {
    let table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'conversations'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if table.is_none() {
        return Err(PersistenceError::Verify(
            "conversations table is missing".to_string(),
        ));
    }

    conn.execute(
        "INSERT INTO _health_check (checked_at) VALUES (?1)",
        params![now_timestamp()],
    )
    .map_err(|e| PersistenceError::Verify(format!("health check write failed: {e}")))?;

    debug!("Schema verified");
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().await;
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for expected in [
            "conversations",
            "entities",
            "facts",
            "relationships",
            "summaries",
            "usage",
            "workflows",
            "_health_check",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_health_row_written() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().await;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM _health_check", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_open_file_creates_parent_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");

        {
            let db = Database::open(&path).unwrap();
            assert!(db.ping().await);
        }
        assert!(path.exists());

        // Second open re-runs the idempotent schema and adds a health row
        let db = Database::open(&path).unwrap();
        let conn = db.conn().await;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM _health_check", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_timestamp();
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }
}
