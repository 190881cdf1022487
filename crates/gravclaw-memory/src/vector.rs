//! Nearest-neighbor index for long-term recall.
//!
//! Message mirrors, media descriptions and file chunks are upserted here by
//! id; search returns the closest records by cosine similarity.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::PersistenceError;
use crate::store::{now_timestamp, Database};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the record with the same id.
    async fn upsert(&self, record: VectorRecord) -> Result<(), PersistenceError>;

    /// Best `top_k` matches, highest score first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, PersistenceError>;

    fn name(&self) -> &str;
}

/// Cosine similarity. Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

fn rank(mut matches: Vec<VectorMatch>, top_k: usize) -> Vec<VectorMatch> {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(top_k);
    matches
}

// ─────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<(), PersistenceError> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, PersistenceError> {
        let records = self.records.read().await;
        let matches = records
            .values()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();
        Ok(rank(matches, top_k))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ─────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────

/// Vectors table in the shared database; scoring is a linear scan.
pub struct SqliteVectorIndex {
    db: Arc<Database>,
}

impl SqliteVectorIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<(), PersistenceError> {
        let embedding = serde_json::to_string(&record.values)?;
        let metadata = serde_json::to_string(&record.metadata)?;
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO vectors (id, embedding, metadata, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                embedding = excluded.embedding,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![record.id, embedding, metadata, now_timestamp()],
        )?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, PersistenceError> {
        let conn = self.db.conn().await;
        let mut stmt = conn.prepare("SELECT id, embedding, metadata FROM vectors")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut matches = Vec::new();
        for row in rows {
            let (id, embedding, metadata) = row?;
            // A corrupt row is skipped rather than failing the whole search
            let Ok(values) = serde_json::from_str::<Vec<f32>>(&embedding) else {
                continue;
            };
            let metadata = serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null);
            matches.push(VectorMatch {
                id,
                score: cosine_similarity(vector, &values),
                metadata,
            });
        }
        Ok(rank(matches, top_k))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: json!({"content": id}),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_in_memory_upsert_replaces() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("a", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("a", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.len().await, 1);

        let hits = index.query(&[0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_in_memory_ranking_and_top_k() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("x", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("y", vec![0.7, 0.7])).await.unwrap();
        index.upsert(record("z", vec![0.0, 1.0])).await.unwrap();

        let hits = index.query(&[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_sqlite_index() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let index = SqliteVectorIndex::new(db.clone());

        index.upsert(record("msg_1", vec![1.0, 0.0, 0.0])).await.unwrap();
        index.upsert(record("msg_2", vec![0.0, 1.0, 0.0])).await.unwrap();
        index
            .upsert(VectorRecord {
                id: "msg_1".into(),
                values: vec![0.0, 0.0, 1.0],
                metadata: json!({"content": "updated"}),
            })
            .await
            .unwrap();

        let hits = index.query(&[0.0, 0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "msg_1");
        assert_eq!(hits[0].metadata["content"], "updated");

        let conn = db.conn().await;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }
}
