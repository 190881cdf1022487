//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig`, `ProvidersConfig`, `MemoryConfig`,
//! `WorkflowConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded from `~/.gravclaw/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub providers: ProvidersConfig,
    pub memory: MemoryConfig,
    pub workflow: WorkflowConfig,
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Role the top-level agent runs as.
    pub role: String,
    /// Maximum model calls per user turn.
    pub max_iterations: u32,
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Verbose logging plus prompt-size diagnostics.
    pub debug: bool,
    /// Reported by the status query.
    pub environment: String,
    /// Resident memory (MB) above which the health check raises an alert.
    pub rss_alert_mb: f64,
    /// Task list read by the briefing and recommendation jobs. `~` is expanded.
    pub task_list_path: String,
    /// Files the workspace scan looks at for `TODO:` / `IDEA:` markers.
    pub watch_files: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            role: "generalist".to_string(),
            max_iterations: 5,
            max_tokens: 4096,
            temperature: 0.7,
            debug: false,
            environment: "development".to_string(),
            rss_alert_mb: 480.0,
            task_list_path: "~/.gravclaw/task.md".to_string(),
            watch_files: vec!["README.md".to_string(), "task.md".to_string()],
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single LLM backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Model for the efficient tier (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model for the high tier. Backends without tiers ignore it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_model: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openrouter: ProviderConfig,
    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,
    /// Per-request transport timeout.
    pub timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openrouter: ProviderConfig::default(),
            gemini: ProviderConfig::default(),
            openai: ProviderConfig::default(),
            timeout_secs: 120,
        }
    }
}

impl ProvidersConfig {
    /// Look up a provider config by name.
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openrouter" => Some(&self.openrouter),
            "gemini" => Some(&self.gemini),
            "openai" => Some(&self.openai),
            _ => None,
        }
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        match name {
            "openrouter" => Some(&mut self.openrouter),
            "gemini" => Some(&mut self.gemini),
            "openai" => Some(&mut self.openai),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────

/// Which nearest-neighbor index mirrors the raw log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorIndexKind {
    /// Vectors table in the same SQLite file.
    #[default]
    Sqlite,
    /// Process-local, lost on restart.
    Memory,
    /// No long-term index; only stored facts are searched.
    None,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    /// SQLite database path. `~` is expanded.
    pub db_path: String,
    /// 64 hex chars (AES-256). Empty means plaintext at rest.
    pub encryption_key: String,
    pub embedding_model: String,
    pub vector_index: VectorIndexKind,
    /// Unpruned message count above which the oldest batch is summarized.
    pub prune_threshold: usize,
    pub prune_batch: usize,
    /// Messages with more words than this are mined for facts.
    pub memorize_min_words: usize,
    /// How many recent facts are scored per search.
    pub fact_window: usize,
    pub fact_similarity_floor: f32,
    pub fact_top_n: usize,
    pub vector_top_k: usize,
    pub vector_similarity_floor: f32,
    /// Minimum chat facts before consolidation runs.
    pub consolidation_min_facts: usize,
    pub recent_context_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.gravclaw/data/memory.db".to_string(),
            encryption_key: String::new(),
            embedding_model: "text-embedding-004".to_string(),
            vector_index: VectorIndexKind::Sqlite,
            prune_threshold: 20,
            prune_batch: 10,
            memorize_min_words: 3,
            fact_window: 500,
            fact_similarity_floor: 0.65,
            fact_top_n: 3,
            vector_top_k: 5,
            vector_similarity_floor: 0.60,
            consolidation_min_facts: 5,
            recent_context_limit: 5,
        }
    }
}

// ─────────────────────────────────────────────
// Workflow
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowConfig {
    /// Maximum nesting of `delegate_task` calls.
    pub max_delegation_depth: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: 3,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.role, "generalist");
        assert_eq!(config.memory.prune_threshold, 20);
        assert_eq!(config.memory.prune_batch, 10);
        assert_eq!(config.memory.fact_window, 500);
        assert_eq!(config.workflow.max_delegation_depth, 3);
        assert_eq!(config.providers.timeout_secs, 120);
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let json = r#"{
            "agent": {"maxIterations": 8, "debug": true},
            "providers": {
                "gemini": {"apiKey": "g-key", "highModel": "gemini-pro"},
                "openrouter": {"apiKey": "or-key", "apiBase": "https://proxy.local/v1"}
            },
            "memory": {"encryptionKey": "00ff", "factTopN": 7, "vectorIndex": "memory"}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.agent.max_iterations, 8);
        assert!(config.agent.debug);
        assert_eq!(config.providers.gemini.api_key, "g-key");
        assert_eq!(config.providers.gemini.high_model.as_deref(), Some("gemini-pro"));
        assert_eq!(
            config.providers.openrouter.api_base.as_deref(),
            Some("https://proxy.local/v1")
        );
        assert_eq!(config.memory.encryption_key, "00ff");
        assert_eq!(config.memory.fact_top_n, 7);
        assert_eq!(config.memory.vector_index, VectorIndexKind::Memory);
        // untouched defaults survive
        assert_eq!(config.memory.prune_batch, 10);
        assert_eq!(config.agent.temperature, 0.7);
    }

    #[test]
    fn test_config_json_uses_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["agent"].get("maxIterations").is_some());
        assert!(json["memory"].get("pruneThreshold").is_some());
        assert!(json["memory"].get("prune_threshold").is_none());
        assert!(json["workflow"].get("maxDelegationDepth").is_some());
    }

    #[test]
    fn test_provider_config_is_configured() {
        let mut p = ProviderConfig::default();
        assert!(!p.is_configured());
        p.api_key = "sk-test".into();
        assert!(p.is_configured());
    }

    #[test]
    fn test_providers_get_by_name() {
        let mut providers = ProvidersConfig::default();
        providers.get_by_name_mut("openai").unwrap().api_key = "oa".into();

        assert!(providers.get_by_name("openai").unwrap().is_configured());
        assert!(!providers.get_by_name("gemini").unwrap().is_configured());
        assert!(providers.get_by_name("nonexistent").is_none());
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.memory.embedding_model, "text-embedding-004");
        assert_eq!(config.memory.vector_index, VectorIndexKind::Sqlite);
        assert!(config.memory.encryption_key.is_empty());
    }
}
