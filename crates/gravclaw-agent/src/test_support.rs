//! Fakes shared by this crate's tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gravclaw_core::config::schema::MemoryConfig;
use gravclaw_core::types::{LlmResponse, Message, ModelTier, ToolCall, ToolDefinition, UsageInfo};
use gravclaw_memory::{Database, EmbeddingError, EmbeddingProvider, FieldCipher, MemoryManager};
use gravclaw_providers::{LlmProvider, LlmRequestConfig, ProviderError, ProviderFailure};

/// Scripted model. Rules (needle in the last message -> reply) answer first
/// and never consume the queue; everything else pops the queue in order.
pub struct ScriptedLlm {
    rules: Vec<(&'static str, String)>,
    responses: Mutex<VecDeque<LlmResponse>>,
    fallback: String,
    fail: bool,
    calls: Mutex<Vec<(Vec<Message>, bool, ModelTier)>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<LlmResponse>) -> Arc<Self> {
        Self::build(Vec::new(), responses, "(no more responses)", false)
    }

    pub fn with_rules(rules: Vec<(&'static str, &str)>, responses: Vec<LlmResponse>) -> Arc<Self> {
        Self::build(rules, responses, "(no more responses)", false)
    }

    /// Always answers `reply`.
    pub fn constant(reply: &str) -> Arc<Self> {
        Self::build(Vec::new(), Vec::new(), reply, false)
    }

    /// Every call fails as if the whole chain were down.
    pub fn failing() -> Arc<Self> {
        Self::build(Vec::new(), Vec::new(), "", true)
    }

    fn build(
        rules: Vec<(&'static str, &str)>,
        responses: Vec<LlmResponse>,
        fallback: &str,
        fail: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            rules: rules.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
            responses: Mutex::new(responses.into()),
            fallback: fallback.to_string(),
            fail,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls whose last message contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(msgs, _, _)| msgs.last().is_some_and(|m| m.text().contains(needle)))
            .count()
    }

    /// Last-message text of every call, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(msgs, _, _)| msgs.last().map(|m| m.text()).unwrap_or_default())
            .collect()
    }

    /// Full transcript of call `n`.
    pub fn call(&self, n: usize) -> Vec<Message> {
        self.calls.lock().unwrap()[n].0.clone()
    }

    pub fn had_tools(&self, n: usize) -> bool {
        self.calls.lock().unwrap()[n].1
    }

    pub fn tier(&self, n: usize) -> ModelTier {
        self.calls.lock().unwrap()[n].2
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        self.calls.lock().unwrap().push((
            messages.to_vec(),
            tools.is_some_and(|t| !t.is_empty()),
            config.tier,
        ));
        if self.fail {
            return Err(ProviderError::Exhausted(vec![ProviderFailure {
                provider: "stub".into(),
                message: "service unavailable".into(),
            }]));
        }

        let prompt = messages.last().map(|m| m.text()).unwrap_or_default();
        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return Ok(text(reply));
        }
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| text(&self.fallback)))
    }

    fn default_model(&self) -> &str {
        "gemini-test"
    }

    fn display_name(&self) -> &str {
        "scripted"
    }
}

pub fn text(content: &str) -> LlmResponse {
    LlmResponse {
        content: Some(content.to_string()),
        usage: Some(UsageInfo {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        }),
        model: Some("gemini-test".to_string()),
        ..Default::default()
    }
}

/// A response requesting the given `(id, tool, json args)` calls.
pub fn calls(requested: &[(&str, &str, &str)]) -> LlmResponse {
    LlmResponse {
        content: None,
        tool_calls: requested
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, *args))
            .collect(),
        usage: Some(UsageInfo {
            prompt_tokens: 50,
            completion_tokens: 10,
            total_tokens: 60,
        }),
        model: Some("gemini-test".to_string()),
        ..Default::default()
    }
}

/// Every text embeds to the same unit vector, so every fact matches.
pub struct FlatEmbedder;

#[async_trait]
impl EmbeddingProvider for FlatEmbedder {
    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

/// In-memory store whose own model answers `[]` to fact mining.
pub fn memory() -> Arc<MemoryManager> {
    memory_with_llm(ScriptedLlm::constant("[]"))
}

pub fn memory_with_llm(llm: Arc<dyn LlmProvider>) -> Arc<MemoryManager> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    Arc::new(MemoryManager::new(
        db,
        FieldCipher::plaintext(),
        Arc::new(FlatEmbedder),
        None,
        llm,
        MemoryConfig::default(),
    ))
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
