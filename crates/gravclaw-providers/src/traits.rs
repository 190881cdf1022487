//! LLM Provider trait: the one interface every backend and the failover
//! router implement.

use async_trait::async_trait;
use gravclaw_core::types::{LlmResponse, Message, ModelTier, ToolDefinition};

use crate::error::ProviderError;

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Model class. Backends without tiers ignore it.
    pub tier: ModelTier,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            tier: ModelTier::Efficient,
        }
    }
}

impl LlmRequestConfig {
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat request.
    ///
    /// # Arguments
    /// * `messages`: Role-tagged conversation history.
    /// * `tools`: Optional list of tool definitions the LLM can call.
    /// * `config`: Temperature, max_tokens, tier.
    ///
    /// # Returns
    /// The normalized response, or the reason this backend could not answer.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError>;

    /// The model used for the efficient tier.
    fn default_model(&self) -> &str;

    /// Display name for logging and failure reports.
    fn display_name(&self) -> &str;
}
