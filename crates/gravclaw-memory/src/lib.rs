//! Persistent, tiered memory for the Gravclaw agent.
//!
//! - `store`: the SQLite database and schema
//! - `manager`: raw log, facts, summaries, usage and media/file indexing
//! - `graph`: entity and relationship extraction storage
//! - `vector`: nearest-neighbor index used for long-term recall
//! - `embeddings`, `crypto`, `usage`: supporting pieces

pub mod crypto;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod manager;
pub mod store;
pub mod usage;
pub mod vector;

#[cfg(test)]
mod test_support;

pub use crypto::{CryptoError, FieldCipher};
pub use embeddings::{EmbeddingError, EmbeddingProvider, GeminiEmbeddings};
pub use error::{MemoryError, MemoryResult, PersistenceError};
pub use manager::{ConsolidationReport, Fact, FactKind, HistoryEntry, MemoryManager, Summary};
pub use store::Database;
pub use usage::UsageSummary;
pub use vector::{InMemoryVectorIndex, SqliteVectorIndex, VectorIndex, VectorMatch, VectorRecord};
