//! Embedding providers.
//!
//! Facts and index entries are embedded with the same provider so vectors
//! stay comparable across the store.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("empty embedding response")]
    Empty,

    #[error("embedding provider not configured")]
    NotConfigured,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Return the embedding dimension for this provider/model.
    fn dimension(&self) -> usize;
    /// Embed a single text string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

// ---------------------------------------------------------------------------
// Google Gemini
// ---------------------------------------------------------------------------

pub struct GeminiEmbeddings {
    api_key: String,
    api_base: String,
    model: String,
    dimension: usize,
    client: Client,
}

impl GeminiEmbeddings {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-004".to_string());
        Self {
            api_key,
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model,
            dimension: 768,
            client: Client::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(Serialize)]
struct GeminiEmbedRequest<'a> {
    content: GeminiContent<'a>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiEmbedValues,
}

#[derive(Deserialize)]
struct GeminiEmbedValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.api_key.is_empty() {
            return Err(EmbeddingError::NotConfigured);
        }
        let url = format!(
            "{}/models/{}:embedContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );
        let body = GeminiEmbedRequest {
            content: GeminiContent {
                parts: vec![GeminiPart { text }],
            },
        };
        let res: GeminiEmbedResponse = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if res.embedding.values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        Ok(res.embedding.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_gemini_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:embedContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "content": {"parts": [{"text": "hello"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": {"values": [0.1, 0.2, 0.3]}
            })))
            .mount(&server)
            .await;

        let embedder = GeminiEmbeddings::new("g-key".into(), None).with_api_base(server.uri());
        let v = embedder.embed("hello").await.unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.dimension(), 768);
    }

    #[tokio::test]
    async fn test_gemini_embed_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let embedder = GeminiEmbeddings::new("g-key".into(), None).with_api_base(server.uri());
        assert!(matches!(
            embedder.embed("x").await,
            Err(EmbeddingError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let embedder = GeminiEmbeddings::new(String::new(), None);
        assert!(matches!(
            embedder.embed("x").await,
            Err(EmbeddingError::NotConfigured)
        ));
    }
}
