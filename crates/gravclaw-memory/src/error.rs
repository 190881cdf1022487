//! Error types for the memory store.

use gravclaw_providers::ProviderError;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::embeddings::EmbeddingError;

/// Storage-layer failure. Fatal at startup; logged and swallowed in
/// background writes.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("schema initialization failed: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("schema verification failed: {0}")]
    Verify(String),

    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Codec(e.to_string())
    }
}

/// Anything a memory operation can fail with.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("LLM call failed: {0}")]
    Llm(#[from] ProviderError),

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("embedding dimension {got} does not match store dimension {expected}")]
    Dimension { expected: usize, got: usize },
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::Persistence(PersistenceError::Query(e))
    }
}

impl From<CryptoError> for MemoryError {
    fn from(e: CryptoError) -> Self {
        MemoryError::Persistence(PersistenceError::Crypto(e))
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;
