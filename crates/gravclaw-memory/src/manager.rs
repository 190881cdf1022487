//! Tiered memory manager.
//!
//! Every logged message lands in the raw conversation log first. From there
//! background tasks mirror it into the vector index, mine it for facts and
//! graph triples, and fold the oldest unpruned batch into a rolling summary.
//! Reads combine recent raw history, the latest summary and semantic recall.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use gravclaw_core::config::schema::{MemoryConfig, VectorIndexKind};
use gravclaw_core::types::{Attachment, ContentPart, Message, MessageContent, Role};
use gravclaw_core::utils::{expand_home, extract_json, safe_identifier, take_chars, word_count};
use gravclaw_providers::{LlmProvider, LlmRequestConfig};

use crate::crypto::FieldCipher;
use crate::embeddings::{EmbeddingProvider, GeminiEmbeddings};
use crate::error::{MemoryError, MemoryResult};
use crate::graph::{apply_graph, ExtractedGraph, GraphWrite};
use crate::store::{now_timestamp, Database};
use crate::usage::{estimate_cost, UsageSummary};
use crate::vector::{cosine_similarity, InMemoryVectorIndex, SqliteVectorIndex, VectorIndex, VectorRecord};

const FILE_CHUNK_CHARS: usize = 1000;
const LESSON_LIMIT: usize = 10;

// ─────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactKind {
    ChatFact,
    UserPreference,
    StrategicLesson,
    MediaContext,
    FileChunk,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::ChatFact => "chat_fact",
            FactKind::UserPreference => "user_preference",
            FactKind::StrategicLesson => "strategic_lesson",
            FactKind::MediaContext => "media_context",
            FactKind::FileChunk => "file_chunk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "chat_fact" => FactKind::ChatFact,
            "user_preference" => FactKind::UserPreference,
            "strategic_lesson" => FactKind::StrategicLesson,
            "media_context" => FactKind::MediaContext,
            "file_chunk" => FactKind::FileChunk,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fact {
    pub id: i64,
    pub content: String,
    pub kind: FactKind,
    pub created_at: String,
    pub source_message_id: Option<i64>,
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub id: i64,
    pub content: String,
    pub last_pruned_id: i64,
    pub timestamp: String,
}

/// One entry of assembled history, oldest first.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn to_message(&self) -> Message {
        match self.role {
            Role::System => Message::system(self.content.clone()),
            Role::Assistant => Message::assistant(self.content.clone()),
            Role::User | Role::Tool => Message::user(self.content.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub merged: usize,
    pub deleted: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConsolidationOp {
    Merge {
        #[serde(rename = "mergeIds")]
        merge_ids: Vec<i64>,
        #[serde(rename = "newFact")]
        new_fact: String,
    },
    Delete {
        #[serde(rename = "deleteIds")]
        delete_ids: Vec<i64>,
        #[serde(default)]
        reason: Option<String>,
    },
}

// ─────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────

fn summarize_prompt(previous: Option<&str>, history: &str) -> String {
    let prev = previous
        .map(|s| format!("Previous Summary: {s}\n\n"))
        .unwrap_or_default();
    format!(
        "You are a conversation compressor. \n\
Summarize the following conversation history into a concise but information-dense summary. \n\
Include key decisions, topics discussed, and project status.\n\
If a previous summary exists, incorporate its key points into the NEW summary.\n\
\n\
{prev}\n\
New Messages to compress:\n\
{history}\n\
\n\
Return ONLY the summary text. No preamble. Keep it under 250 words."
    )
}

fn memorize_prompt(content: &str) -> String {
    format!(
        "Analyze the following message and extract any core, permanent facts that are worth remembering for the future.\n\
Focus on user preferences, biographical info, specific requests, or important context.\n\
Do not extract trivial conversational filler.\n\
\n\
Message: \"{content}\"\n\
\n\
Return ONLY a JSON array of strings. Example: [\"User lives in Bali\", \"User prefers dark mode\"].\n\
If nothing worth saving, return []."
    )
}

fn consolidate_prompt(fact_list: &str) -> String {
    format!(
        "You are a Memory Specialist. Below is a list of extracted facts from a user's conversation.\n\
Your goal is to find facts that are redundant, similar, or contradictory, and propose a consolidated list.\n\
\n\
Input Facts:\n\
{fact_list}\n\
\n\
Rules:\n\
1. Merge similar info (e.g., \"User lives in Bali\" and \"User is based in Bali\").\n\
2. Retain the most detail.\n\
3. Resolve contradictions (use the most recent if timestamp/logic suggests it).\n\
4. Return ONLY a JSON array of objects: [{{\"mergeIds\": [ID1, ID2], \"newFact\": \"Consolidated Fact\"}}, {{\"deleteIds\": [ID3], \"reason\": \"redundant\"}}]\n\
5. If no changes needed, return [].\n\
\n\
Return ONLY the JSON."
    )
}

fn graph_prompt(content: &str) -> String {
    format!(
        "Analyze the following message and extract a structured Knowledge Graph.\n\
Identify Entities (People, Projects, Places, Organizations, Tools) and their Relationships.\n\
\n\
Message: \"{content}\"\n\
\n\
Return ONLY a JSON object with this structure:\n\
{{\n  \"entities\": [{{\"name\": \"Ray\", \"type\": \"Person\", \"description\": \"Client representative\"}}],\n  \
\"relationships\": [{{\"subject\": \"Ray\", \"predicate\": \"works_at\", \"object\": \"741agency\"}}]\n}}\n\
\n\
Valid Types: Person, Project, Place, Organization, Tool.\n\
Valid Predicates: works_at, involved_in, uses, located_at, friend_of, part_of, owns.\n\
\n\
If nothing found, return {{\"entities\":[], \"relationships\":[]}}."
    )
}

fn media_prompt(mime_type: &str) -> String {
    format!(
        "You are a Visual Intelligence agent. \n\
Analyze the provided media ({mime_type}) and provide a detailed, information-dense description.\n\
Focus on:\n\
1. Entities: People, places, things.\n\
2. Text: OCR any readable text.\n\
3. Context: What is the purpose of this media? (e.g., \"A receipt for coffee\", \"A system architecture diagram\").\n\
\n\
Return ONLY the description."
    )
}

/// SHA-256 of the base64 payload, hex encoded.
pub fn media_hash(attachment: &Attachment) -> String {
    hex::encode(Sha256::digest(attachment.data.as_bytes()))
}

/// Split on line boundaries into chunks of at most `max` chars (a single
/// longer line becomes its own chunk).
pub fn split_into_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if !current.is_empty() && current.len() + line.len() > max {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

// ─────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────

pub struct MemoryManager {
    db: Arc<Database>,
    cipher: FieldCipher,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Option<Arc<dyn VectorIndex>>,
    llm: Arc<dyn LlmProvider>,
    config: MemoryConfig,
    prune_lock: Mutex<()>,
}

impl MemoryManager {
    pub fn new(
        db: Arc<Database>,
        cipher: FieldCipher,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Option<Arc<dyn VectorIndex>>,
        llm: Arc<dyn LlmProvider>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            db,
            cipher,
            embedder,
            index,
            llm,
            config,
            prune_lock: Mutex::new(()),
        }
    }

    /// Open the configured database and wire the default embedder and index.
    /// Fails when the store cannot be opened or verified.
    pub fn from_config(
        config: &MemoryConfig,
        gemini_api_key: &str,
        llm: Arc<dyn LlmProvider>,
    ) -> MemoryResult<Self> {
        let db = Arc::new(Database::open(&expand_home(&config.db_path))?);
        let cipher = FieldCipher::from_hex(&config.encryption_key)?;
        if !cipher.is_enabled() {
            warn!("No encryption key configured, memory is stored in plaintext");
        }
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(GeminiEmbeddings::new(
            gemini_api_key.to_string(),
            Some(config.embedding_model.clone()),
        ));
        let index: Option<Arc<dyn VectorIndex>> = match config.vector_index {
            VectorIndexKind::Sqlite => Some(Arc::new(SqliteVectorIndex::new(db.clone()))),
            VectorIndexKind::Memory => Some(Arc::new(InMemoryVectorIndex::new())),
            VectorIndexKind::None => None,
        };
        Ok(Self::new(db, cipher, embedder, index, llm, config.clone()))
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    async fn complete(&self, prompt: String) -> MemoryResult<String> {
        let resp = self
            .llm
            .chat(&[Message::user(prompt)], None, &LlmRequestConfig::default())
            .await?;
        Ok(resp.content_or_empty().trim().to_string())
    }

    // ── Write path ──

    /// Persist a message, then fan out the background work. Returns the row
    /// id, or `None` when there was nothing to store.
    pub async fn log_message(
        self: &Arc<Self>,
        role: Role,
        content: &MessageContent,
        metadata: Option<Value>,
    ) -> MemoryResult<Option<i64>> {
        let mut text = content.text();
        let attachments = content.attachments();
        if !attachments.is_empty() {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.index_media(&attachments, role).await;
            });
            if text.trim().is_empty() {
                text = "[Media Attachment]".to_string();
            }
        }
        if text.trim().is_empty() {
            return Ok(None);
        }

        let id = self.insert_message(role, &text, metadata.as_ref()).await?;

        if self.index.is_some() {
            let this = Arc::clone(self);
            let mirrored = text.clone();
            tokio::spawn(async move {
                if let Err(e) = this.mirror_message(id, role, &mirrored, metadata).await {
                    warn!(id, error = %e, "Vector mirror failed");
                }
            });
        }

        if word_count(&text) > self.config.memorize_min_words {
            let this = Arc::clone(self);
            let mined = text.clone();
            tokio::spawn(async move {
                if let Err(e) = this.memorize(&mined, id).await {
                    debug!(id, error = %e, "Memorization skipped");
                }
            });
        }

        self.check_pruning().await;
        Ok(Some(id))
    }

    /// Plain-text shorthand for `log_message`.
    pub async fn log_text(self: &Arc<Self>, role: Role, text: &str) -> MemoryResult<Option<i64>> {
        self.log_message(role, &MessageContent::Text(text.to_string()), None)
            .await
    }

    async fn insert_message(&self, role: Role, text: &str, metadata: Option<&Value>) -> MemoryResult<i64> {
        let content = self.cipher.encrypt(text)?;
        let metadata = match metadata {
            Some(m) => Some(self.cipher.encrypt(&m.to_string())?),
            None => None,
        };
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO conversations (role, content, timestamp, metadata) VALUES (?1, ?2, ?3, ?4)",
            params![role.as_str(), content, now_timestamp(), metadata],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn mirror_message(
        &self,
        id: i64,
        role: Role,
        text: &str,
        metadata: Option<Value>,
    ) -> MemoryResult<()> {
        let Some(index) = &self.index else {
            return Ok(());
        };
        let values = self.embedder.embed(text).await?;
        let mut meta = json!({
            "type": "message",
            "role": role.as_str(),
            "content": self.cipher.encrypt(text)?,
            "timestamp": now_timestamp(),
        });
        if let (Some(Value::Object(extra)), Some(obj)) = (metadata, meta.as_object_mut()) {
            for (k, v) in extra {
                obj.entry(k).or_insert(v);
            }
        }
        index
            .upsert(VectorRecord {
                id: format!("msg_{id}"),
                values,
                metadata: meta,
            })
            .await?;
        Ok(())
    }

    pub async fn unpruned_count(&self) -> MemoryResult<usize> {
        let conn = self.db.conn().await;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE is_pruned = 0",
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    pub async fn message_count(&self) -> MemoryResult<usize> {
        let conn = self.db.conn().await;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    async fn check_pruning(&self) {
        // Another task is already compressing.
        let Ok(_guard) = self.prune_lock.try_lock() else {
            return;
        };
        match self.unpruned_count().await {
            Ok(n) if n > self.config.prune_threshold => {
                info!(unpruned = n, "Pruning trigger hit");
                if let Err(e) = self.summarize_batch(self.config.prune_batch).await {
                    warn!(error = %e, "Summarization failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Pruning check failed"),
        }
    }

    /// Fold the oldest `count` unpruned messages into a new summary. Returns
    /// the summary id, or `None` when fewer than two messages were available.
    pub async fn summarize_history(&self, count: usize) -> MemoryResult<Option<i64>> {
        let _guard = self.prune_lock.lock().await;
        self.summarize_batch(count).await
    }

    async fn summarize_batch(&self, count: usize) -> MemoryResult<Option<i64>> {
        let batch: Vec<(i64, String, String)> = {
            let conn = self.db.conn().await;
            let mut stmt = conn.prepare(
                "SELECT id, role, content FROM conversations
                 WHERE is_pruned = 0 ORDER BY timestamp ASC, id ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![count as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };
        if batch.len() < 2 {
            return Ok(None);
        }

        let mut lines = Vec::with_capacity(batch.len());
        for (_, role, content) in &batch {
            lines.push(format!("{}: {}", role, self.cipher.decrypt(content)?));
        }
        let previous = self.latest_summary().await?;
        let prompt = summarize_prompt(previous.as_ref().map(|s| s.content.as_str()), &lines.join("\n"));
        let summary = self.complete(prompt).await?;

        let last_id = batch[batch.len() - 1].0;
        let encrypted = self.cipher.encrypt(&summary)?;
        let mut conn = self.db.conn().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO summaries (content, last_pruned_id, timestamp) VALUES (?1, ?2, ?3)",
            params![encrypted, last_id, now_timestamp()],
        )?;
        let summary_id = tx.last_insert_rowid();
        for (id, _, _) in &batch {
            tx.execute(
                "UPDATE conversations SET is_pruned = 1 WHERE id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;

        info!(
            pruned = batch.len(),
            summary_chars = summary.len(),
            "Summarized history"
        );
        Ok(Some(summary_id))
    }

    pub async fn latest_summary(&self) -> MemoryResult<Option<Summary>> {
        let row: Option<(i64, String, i64, String)> = {
            let conn = self.db.conn().await;
            conn.query_row(
                "SELECT id, content, last_pruned_id, timestamp FROM summaries
                 ORDER BY timestamp DESC, id DESC LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?
        };
        match row {
            Some((id, content, last_pruned_id, timestamp)) => Ok(Some(Summary {
                id,
                content: self.cipher.decrypt(&content)?,
                last_pruned_id,
                timestamp,
            })),
            None => Ok(None),
        }
    }

    // ── Facts ──

    /// Mine a message for durable facts and graph triples.
    pub async fn memorize(&self, content: &str, source_id: i64) -> MemoryResult<usize> {
        let raw = self.complete(memorize_prompt(content)).await?;
        let facts: Vec<String> = serde_json::from_str(extract_json(&raw))
            .map_err(|e| MemoryError::Parse(format!("fact list: {e}")))?;

        let mut stored = 0;
        for fact in facts.iter().filter(|f| !f.trim().is_empty()) {
            match self
                .store_fact(fact, Some(source_id), FactKind::ChatFact, None)
                .await
            {
                Ok(_) => stored += 1,
                Err(e) => warn!(error = %e, "Failed to store fact"),
            }
        }

        if let Err(e) = self.extract_graph(content).await {
            debug!(error = %e, "Graph extraction skipped");
        }
        Ok(stored)
    }

    pub async fn store_fact(
        &self,
        content: &str,
        source_message_id: Option<i64>,
        kind: FactKind,
        metadata: Option<Value>,
    ) -> MemoryResult<i64> {
        let embedding = self.embedder.embed(content).await?;
        let expected = self.embedder.dimension();
        if embedding.len() != expected {
            return Err(MemoryError::Dimension {
                expected,
                got: embedding.len(),
            });
        }
        let encoded = serde_json::to_string(&embedding).map_err(crate::error::PersistenceError::from)?;
        let encrypted = self.cipher.encrypt(content)?;
        let metadata = metadata.map(|m| m.to_string());

        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO facts (content, embedding, created_at, source_message_id, type, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![encrypted, encoded, now_timestamp(), source_message_id, kind.as_str(), metadata],
        )?;
        debug!(kind = kind.as_str(), fact = %take_chars(content, 50), "Stored fact");
        Ok(conn.last_insert_rowid())
    }

    /// Facts of one kind, newest first.
    pub async fn list_facts(&self, kind: FactKind, limit: usize) -> MemoryResult<Vec<Fact>> {
        let rows: Vec<(i64, String, String, Option<i64>, Option<String>)> = {
            let conn = self.db.conn().await;
            let mut stmt = conn.prepare(
                "SELECT id, content, created_at, source_message_id, metadata FROM facts
                 WHERE type = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![kind.as_str(), limit as i64], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        rows.into_iter()
            .map(|(id, content, created_at, source_message_id, metadata)| {
                Ok(Fact {
                    id,
                    content: self.cipher.decrypt(&content)?,
                    kind,
                    created_at,
                    source_message_id,
                    metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                })
            })
            .collect()
    }

    /// Tagged lines for prompt context. Failures are logged and yield
    /// whatever was gathered so far.
    pub async fn search_relevant_facts(&self, query: &str) -> Vec<String> {
        let embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Memory search skipped, query embedding failed");
                return Vec::new();
            }
        };

        let mut results = match self.score_facts(&embedding).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "Fact search failed");
                Vec::new()
            }
        };

        if let Some(index) = &self.index {
            match index.query(&embedding, self.config.vector_top_k).await {
                Ok(matches) => {
                    for m in matches
                        .into_iter()
                        .filter(|m| m.score > self.config.vector_similarity_floor)
                    {
                        if let Some(line) = self.render_index_hit(&m.metadata) {
                            results.push(line);
                        }
                    }
                }
                Err(e) => warn!(index = index.name(), error = %e, "Long-term search failed"),
            }
        }

        results
    }

    async fn score_facts(&self, query: &[f32]) -> MemoryResult<Vec<String>> {
        let rows: Vec<(String, String, String, Option<String>)> = {
            let conn = self.db.conn().await;
            let mut stmt = conn.prepare(
                "SELECT content, embedding, type, metadata FROM facts ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![self.config.fact_window as i64], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        let mut scored = Vec::new();
        for (content, embedding, kind, metadata) in rows {
            let Ok(values) = serde_json::from_str::<Vec<f32>>(&embedding) else {
                continue;
            };
            let score = cosine_similarity(query, &values);
            if score <= self.config.fact_similarity_floor {
                continue;
            }
            let Ok(content) = self.cipher.decrypt(&content) else {
                continue;
            };
            scored.push((score, kind, metadata, content));
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(self.config.fact_top_n);

        Ok(scored
            .into_iter()
            .map(|(_, kind, metadata, content)| match FactKind::parse(&kind) {
                Some(FactKind::MediaContext) => format!("[VISUAL MEMORY] {content}"),
                Some(FactKind::UserPreference) => format!("[PREFERENCE] {content}"),
                Some(FactKind::FileChunk) => {
                    let path = metadata
                        .and_then(|m| serde_json::from_str::<Value>(&m).ok())
                        .and_then(|m| m["filePath"].as_str().map(str::to_string))
                        .unwrap_or_default();
                    format!("[FILE: {path}] {content}")
                }
                _ => format!("[FACT] {content}"),
            })
            .collect())
    }

    fn render_index_hit(&self, meta: &Value) -> Option<String> {
        let content = self.cipher.decrypt(meta["content"].as_str()?).ok()?;
        Some(match meta["type"].as_str() {
            Some("file_chunk") => format!(
                "[FILE: {}] {}",
                meta["filePath"].as_str().unwrap_or_default(),
                content
            ),
            Some("media_memory") => format!("[VISUAL MEMORY] {content}"),
            _ => format!(
                "[CHAT] {}: {}",
                meta["role"].as_str().unwrap_or("user"),
                content
            ),
        })
    }

    /// The latest `limit` unpruned messages, oldest first, preceded by the
    /// current summary when one exists.
    pub async fn recent_context(&self, limit: usize) -> MemoryResult<Vec<HistoryEntry>> {
        let rows: Vec<(String, String)> = {
            let conn = self.db.conn().await;
            let mut stmt = conn.prepare(
                "SELECT role, content FROM conversations
                 WHERE is_pruned = 0 ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |r| Ok((r.get(0)?, r.get(1)?)))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut history = Vec::with_capacity(rows.len() + 1);
        if let Some(summary) = self.latest_summary().await? {
            history.push(HistoryEntry {
                role: Role::System,
                content: format!("[HISTORICAL CONTEXT SUMMARY]: {}", summary.content),
            });
        }
        for (role, content) in rows.into_iter().rev() {
            history.push(HistoryEntry {
                role: role.parse().unwrap_or(Role::System),
                content: self.cipher.decrypt(&content)?,
            });
        }
        Ok(history)
    }

    pub async fn strategic_lessons(&self) -> MemoryResult<Vec<String>> {
        let rows: Vec<String> = {
            let conn = self.db.conn().await;
            let mut stmt = conn.prepare(
                "SELECT content FROM facts
                 WHERE type IN ('strategic_lesson', 'user_preference')
                 ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![LESSON_LIMIT as i64], |r| r.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        rows.iter()
            .map(|c| self.cipher.decrypt(c).map_err(MemoryError::from))
            .collect()
    }

    /// Merge and drop redundant chat facts using the model's suggestions.
    pub async fn consolidate_facts(&self) -> MemoryResult<ConsolidationReport> {
        let facts = self.list_facts(FactKind::ChatFact, usize::MAX >> 1).await?;
        if facts.len() < self.config.consolidation_min_facts {
            debug!(facts = facts.len(), "Not enough facts to consolidate");
            return Ok(ConsolidationReport::default());
        }

        let fact_list = facts
            .iter()
            .rev()
            .map(|f| format!("[ID: {}] {}", f.id, f.content))
            .collect::<Vec<_>>()
            .join("\n");
        let raw = self.complete(consolidate_prompt(&fact_list)).await?;
        let ops: Vec<ConsolidationOp> = serde_json::from_str(extract_json(&raw))
            .map_err(|e| MemoryError::Parse(format!("consolidation ops: {e}")))?;

        let mut report = ConsolidationReport::default();
        for op in ops {
            match op {
                ConsolidationOp::Merge { merge_ids, new_fact } => {
                    self.store_fact(&new_fact, None, FactKind::ChatFact, None)
                        .await?;
                    report.deleted += self.delete_chat_facts(&merge_ids).await?;
                    report.merged += 1;
                }
                ConsolidationOp::Delete { delete_ids, reason } => {
                    debug!(ids = ?delete_ids, reason = reason.as_deref().unwrap_or(""), "Deleting facts");
                    report.deleted += self.delete_chat_facts(&delete_ids).await?;
                }
            }
        }

        info!(merged = report.merged, deleted = report.deleted, "Fact consolidation complete");
        Ok(report)
    }

    async fn delete_chat_facts(&self, ids: &[i64]) -> MemoryResult<usize> {
        let conn = self.db.conn().await;
        let mut removed = 0;
        for id in ids {
            removed += conn.execute(
                "DELETE FROM facts WHERE id = ?1 AND type = 'chat_fact'",
                params![id],
            )?;
        }
        Ok(removed)
    }

    // ── Graph ──

    pub async fn extract_graph(&self, content: &str) -> MemoryResult<GraphWrite> {
        let raw = self.complete(graph_prompt(content)).await?;
        let graph: ExtractedGraph = serde_json::from_str(extract_json(&raw))
            .map_err(|e| MemoryError::Parse(format!("graph: {e}")))?;
        if graph.is_empty() {
            return Ok(GraphWrite::default());
        }
        let conn = self.db.conn().await;
        Ok(apply_graph(&conn, &graph)?)
    }

    // ── Usage ──

    pub async fn log_usage(
        &self,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    ) -> MemoryResult<()> {
        let total = if total_tokens == 0 {
            prompt_tokens + completion_tokens
        } else {
            total_tokens
        };
        let cost = estimate_cost(model, prompt_tokens, completion_tokens);
        let conn = self.db.conn().await;
        conn.execute(
            "INSERT INTO usage (model, prompt_tokens, completion_tokens, total_tokens, cost_usd, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![model, prompt_tokens, completion_tokens, total, cost, now_timestamp()],
        )?;
        debug!(model, tokens = total, cost_usd = cost, "Logged usage");
        Ok(())
    }

    /// Usage since midnight UTC.
    pub async fn today_usage(&self) -> MemoryResult<UsageSummary> {
        let since = Utc::now().format("%Y-%m-%dT00:00:00").to_string();
        let conn = self.db.conn().await;
        let summary = conn.query_row(
            "SELECT COALESCE(SUM(prompt_tokens), 0), COALESCE(SUM(completion_tokens), 0),
                    COALESCE(SUM(total_tokens), 0), COALESCE(SUM(cost_usd), 0.0)
             FROM usage WHERE timestamp >= ?1",
            params![since],
            |r| {
                Ok(UsageSummary {
                    prompt_tokens: r.get::<_, i64>(0)? as u64,
                    completion_tokens: r.get::<_, i64>(1)? as u64,
                    total_tokens: r.get::<_, i64>(2)? as u64,
                    cost_usd: r.get(3)?,
                })
            },
        )?;
        Ok(summary)
    }

    // ── Media and files ──

    /// Describe each attachment once, keyed by content hash. Returns the
    /// descriptions (existing ones for duplicates). Failures are logged.
    pub async fn index_media(&self, attachments: &[Attachment], role: Role) -> Vec<String> {
        let mut descriptions = Vec::new();
        for attachment in attachments {
            match self.index_one_media(attachment, role).await {
                Ok(desc) => descriptions.push(desc),
                Err(e) => warn!(mime = %attachment.mime_type, error = %e, "Media indexing failed"),
            }
        }
        descriptions
    }

    async fn index_one_media(&self, attachment: &Attachment, role: Role) -> MemoryResult<String> {
        let hash = media_hash(attachment);

        let existing: Option<String> = {
            let conn = self.db.conn().await;
            conn.query_row(
                "SELECT content FROM facts
                 WHERE type = 'media_context' AND json_extract(metadata, '$.hash') = ?1 LIMIT 1",
                params![hash],
                |r| r.get(0),
            )
            .optional()?
        };
        if let Some(content) = existing {
            debug!(hash = %take_chars(&hash, 8), "Media already indexed");
            return Ok(self.cipher.decrypt(&content)?);
        }

        let message = Message::user_parts(vec![
            ContentPart::text(media_prompt(&attachment.mime_type)),
            ContentPart::attachment(attachment),
        ]);
        let resp = self
            .llm
            .chat(&[message], None, &LlmRequestConfig::default())
            .await?;
        let description = resp.content_or_empty().trim().to_string();
        if description.is_empty() {
            return Err(MemoryError::Parse("empty media description".to_string()));
        }

        self.store_fact(
            &description,
            None,
            FactKind::MediaContext,
            Some(json!({"hash": hash, "mimeType": attachment.mime_type})),
        )
        .await?;

        if let Some(index) = &self.index {
            let values = self.embedder.embed(&description).await?;
            index
                .upsert(VectorRecord {
                    id: format!("media_{hash}"),
                    values,
                    metadata: json!({
                        "type": "media_memory",
                        "role": role.as_str(),
                        "content": self.cipher.encrypt(&description)?,
                        "hash": hash,
                        "timestamp": now_timestamp(),
                    }),
                })
                .await?;
        }

        info!(description = %take_chars(&description, 50), "Indexed media");
        Ok(description)
    }

    /// Chunk a workspace file into `file_chunk` facts and index entries.
    /// Returns the number of chunks stored.
    pub async fn index_file(&self, relative_path: &str, content: &str) -> MemoryResult<usize> {
        let chunks = split_into_chunks(content, FILE_CHUNK_CHARS);
        let total = chunks.len();
        let mut stored = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.trim().is_empty() {
                continue;
            }
            let meta = json!({"filePath": relative_path, "chunkIndex": i, "totalChunks": total});
            self.store_fact(chunk, None, FactKind::FileChunk, Some(meta))
                .await?;

            if let Some(index) = &self.index {
                let values = self.embedder.embed(chunk).await?;
                index
                    .upsert(VectorRecord {
                        id: format!("file_{}_{}", safe_identifier(relative_path), i),
                        values,
                        metadata: json!({
                            "type": "file_chunk",
                            "filePath": relative_path,
                            "content": self.cipher.encrypt(chunk)?,
                            "chunkIndex": i,
                            "totalChunks": total,
                        }),
                    })
                    .await?;
            }
            stored += 1;
        }

        info!(path = relative_path, chunks = stored, "Indexed file");
        Ok(stored)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
