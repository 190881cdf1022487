//! Fakes shared by this crate's tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gravclaw_core::config::schema::MemoryConfig;
use gravclaw_core::types::{LlmResponse, Message, ToolDefinition, UsageInfo};
use gravclaw_providers::{LlmProvider, LlmRequestConfig, ProviderError};

use crate::crypto::FieldCipher;
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::manager::MemoryManager;
use crate::store::Database;
use crate::vector::VectorIndex;

/// Answers by matching a needle in the last message; records every prompt.
pub struct PromptLlm {
    rules: Vec<(&'static str, String)>,
    fallback: String,
    pub prompts: Mutex<Vec<String>>,
}

impl PromptLlm {
    pub fn new(rules: Vec<(&'static str, &str)>) -> Arc<Self> {
        Arc::new(Self {
            rules: rules.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
            fallback: "[]".to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LlmProvider for PromptLlm {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
        _config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        let prompt = messages.last().map(|m| m.text()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Ok(LlmResponse {
            content: Some(reply),
            usage: Some(UsageInfo {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            ..Default::default()
        })
    }

    fn default_model(&self) -> &str {
        "gemini-test"
    }

    fn display_name(&self) -> &str {
        "prompt-stub"
    }
}

/// One dimension per vocabulary word; a text scores 1.0 on every word it
/// contains (case-insensitive).
pub struct KeywordEmbedder {
    vocab: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub fn new(vocab: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self { vocab })
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn dimension(&self) -> usize {
        self.vocab.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        Ok(self
            .vocab
            .iter()
            .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
            .collect())
    }
}

pub const VOCAB: &[&str] = &["bali", "dark", "coffee", "rust", "receipt", "beach"];

pub fn manager_with(
    llm: Arc<PromptLlm>,
    index: Option<Arc<dyn VectorIndex>>,
    cipher: FieldCipher,
    config: MemoryConfig,
) -> Arc<MemoryManager> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    Arc::new(MemoryManager::new(
        db,
        cipher,
        KeywordEmbedder::new(VOCAB.to_vec()),
        index,
        llm,
        config,
    ))
}
