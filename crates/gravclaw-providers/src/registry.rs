//! Provider registry: static specs for the supported backends, in failover
//! order, and the builder that turns config into a provider chain.

use std::sync::Arc;

use tracing::{debug, info};

use gravclaw_core::config::schema::{ProviderConfig, ProvidersConfig};

use crate::error::ProviderError;
use crate::gemini::GeminiProvider;
use crate::http_provider::HttpProvider;
use crate::traits::LlmProvider;

/// Which adapter speaks to a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// `/chat/completions` with bearer auth.
    OpenAiCompat,
    /// Native `generateContent`.
    Gemini,
}

/// Static specification describing one LLM backend.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Config key (e.g. `"openrouter"`).
    pub name: &'static str,
    /// Human-readable name for logs and failure reports.
    pub display_name: &'static str,
    pub kind: ProviderKind,
    pub default_api_base: &'static str,
    pub default_model: &'static str,
    /// Model for `ModelTier::High`, when the backend has tiers.
    pub high_model: Option<&'static str>,
    /// Headers sent on every request.
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Supported backends, in failover order: the aggregator first, then the
/// primary model family, then the last-resort fallback.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter (Claude)",
        kind: ProviderKind::OpenAiCompat,
        default_api_base: "https://openrouter.ai/api/v1",
        default_model: "anthropic/claude-3.5-sonnet",
        high_model: None,
        extra_headers: &[
            ("HTTP-Referer", "https://github.com/gravclaw/gravclaw"),
            ("X-Title", "Gravclaw"),
        ],
    },
    ProviderSpec {
        name: "gemini",
        display_name: "Gemini (Flash)",
        kind: ProviderKind::Gemini,
        default_api_base: "https://generativelanguage.googleapis.com/v1beta",
        default_model: "gemini-2.0-flash",
        high_model: Some("gemini-2.0-pro-exp-02-05"),
        extra_headers: &[],
    },
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI (GPT-4o)",
        kind: ProviderKind::OpenAiCompat,
        default_api_base: "https://api.openai.com/v1",
        default_model: "gpt-4o",
        high_model: None,
        extra_headers: &[],
    },
];

/// Find a provider spec by its config name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| s.name == name)
}

/// Build one adapter for a spec.
pub fn build_provider(
    spec: &'static ProviderSpec,
    config: &ProviderConfig,
    timeout_secs: u64,
) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    Ok(match spec.kind {
        ProviderKind::OpenAiCompat => Arc::new(HttpProvider::new(config, spec, timeout_secs)?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(config, spec, timeout_secs)?),
    })
}

/// Build the failover chain from config. Backends without an API key are
/// left out; an empty chain is an error.
pub fn build_chain(config: &ProvidersConfig) -> Result<Vec<Arc<dyn LlmProvider>>, ProviderError> {
    let mut chain = Vec::new();
    for spec in PROVIDERS {
        let Some(provider_config) = config.get_by_name(spec.name) else {
            continue;
        };
        if !provider_config.is_configured() {
            debug!(provider = spec.display_name, "Skipping provider without API key");
            continue;
        }
        chain.push(build_provider(spec, provider_config, config.timeout_secs)?);
    }

    if chain.is_empty() {
        return Err(ProviderError::NotConfigured(
            "set OPENROUTER_API_KEY, GEMINI_API_KEY or OPENAI_API_KEY".to_string(),
        ));
    }

    info!(
        chain = %chain.iter().map(|p| p.display_name()).collect::<Vec<_>>().join(" -> "),
        "Provider chain ready"
    );
    Ok(chain)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
