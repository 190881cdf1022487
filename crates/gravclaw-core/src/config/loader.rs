//! Config loader: reads `~/.gravclaw/config.json`, applies legacy migrations,
//! env var overrides, and resolves credentials.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.gravclaw/config.json`
//! 3. Environment variables `GRAVCLAW_<SECTION>__<FIELD>` (override JSON)
//! 4. Credential fallbacks: the first non-empty named env var fills any
//!    field still empty after 1-3.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, VectorIndexKind};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    let config = load_config_from_path(&config_path);
    let config = apply_env_overrides(config, &env_lookup);
    let (config, _sources) = resolve_credentials(config, &env_lookup);
    config
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Load config from a specific file path, without env handling.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return Config::default();
        }
    };

    migrate_config(&mut raw);

    match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Moves top-level `dbPath` / `encryptionKey` into the `memory` section.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(obj) = raw.as_object_mut() else {
        return;
    };
    for key in ["dbPath", "encryptionKey"] {
        if let Some(val) = obj.remove(key) {
            let memory = obj
                .entry("memory")
                .or_insert_with(|| serde_json::json!({}));
            if let Some(mem) = memory.as_object_mut() {
                if !mem.contains_key(key) {
                    mem.insert(key.to_string(), val);
                    debug!("Migrated {key} → memory.{key}");
                }
            }
        }
    }
}

/// Apply `GRAVCLAW_<SECTION>__<FIELD>` overrides.
///
/// Supported overrides:
/// - `GRAVCLAW_AGENT__MAX_ITERATIONS`, `__MAX_TOKENS`, `__TEMPERATURE`, `__DEBUG`, `__ROLE`, `__ENVIRONMENT`,
///   `__TASK_LIST_PATH` (plain `TASK_LIST_PATH` is also honored)
/// - `GRAVCLAW_PROVIDERS__<NAME>__API_KEY`, `__API_BASE`, `__MODEL`, `__HIGH_MODEL`
/// - `GRAVCLAW_MEMORY__DB_PATH`, `__ENCRYPTION_KEY`, `__VECTOR_INDEX`
/// - `GRAVCLAW_WORKFLOW__MAX_DELEGATION_DEPTH`
fn apply_env_overrides(mut config: Config, env: &dyn Fn(&str) -> Option<String>) -> Config {
    if let Some(n) = env("GRAVCLAW_AGENT__MAX_ITERATIONS").and_then(|v| v.parse().ok()) {
        config.agent.max_iterations = n;
    }
    if let Some(n) = env("GRAVCLAW_AGENT__MAX_TOKENS").and_then(|v| v.parse().ok()) {
        config.agent.max_tokens = n;
    }
    if let Some(t) = env("GRAVCLAW_AGENT__TEMPERATURE").and_then(|v| v.parse().ok()) {
        config.agent.temperature = t;
    }
    if let Some(val) = env("GRAVCLAW_AGENT__DEBUG") {
        config.agent.debug = val == "true" || val == "1";
    }
    if let Some(val) = env("GRAVCLAW_AGENT__ROLE") {
        config.agent.role = val;
    }
    if let Some(val) = env("GRAVCLAW_AGENT__ENVIRONMENT") {
        config.agent.environment = val;
    }
    if let Some(val) = env("GRAVCLAW_AGENT__TASK_LIST_PATH").or_else(|| env("TASK_LIST_PATH")) {
        config.agent.task_list_path = val;
    }

    for name in ["openrouter", "gemini", "openai"] {
        let upper = name.to_uppercase();
        if let Some(provider) = config.providers.get_by_name_mut(name) {
            if let Some(val) = env(&format!("GRAVCLAW_PROVIDERS__{upper}__API_KEY")) {
                provider.api_key = val;
            }
            if let Some(val) = env(&format!("GRAVCLAW_PROVIDERS__{upper}__API_BASE")) {
                provider.api_base = Some(val);
            }
            if let Some(val) = env(&format!("GRAVCLAW_PROVIDERS__{upper}__MODEL")) {
                provider.model = Some(val);
            }
            if let Some(val) = env(&format!("GRAVCLAW_PROVIDERS__{upper}__HIGH_MODEL")) {
                provider.high_model = Some(val);
            }
        }
    }

    if let Some(val) = env("GRAVCLAW_MEMORY__DB_PATH") {
        config.memory.db_path = val;
    }
    if let Some(val) = env("GRAVCLAW_MEMORY__ENCRYPTION_KEY") {
        config.memory.encryption_key = val;
    }
    if let Some(val) = env("GRAVCLAW_MEMORY__VECTOR_INDEX") {
        match val.as_str() {
            "sqlite" => config.memory.vector_index = VectorIndexKind::Sqlite,
            "memory" => config.memory.vector_index = VectorIndexKind::Memory,
            "none" => config.memory.vector_index = VectorIndexKind::None,
            other => warn!(value = other, "Ignoring unknown vector index kind"),
        }
    }

    if let Some(n) = env("GRAVCLAW_WORKFLOW__MAX_DELEGATION_DEPTH").and_then(|v| v.parse().ok()) {
        config.workflow.max_delegation_depth = n;
    }

    config
}

// ─────────────────────────────────────────────
// Credential resolution
// ─────────────────────────────────────────────

/// Where a resolved credential came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// The config file (or a `GRAVCLAW_*` override) already set it.
    Config,
    /// A named fallback env var.
    Env(String),
    /// Nothing supplied a value.
    Missing,
}

/// Ordered fallback env names per field.
const CREDENTIAL_SOURCES: &[(&str, &[&str])] = &[
    (
        "openrouter",
        &["OPENROUTER_API_KEY", "OPENROUTER_KEY", "OR_API_KEY", "OPENROUTER_TOKEN"],
    ),
    ("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    (
        "openai",
        &["OPENAI_API_KEY", "OPENAI_KEY", "OA_API_KEY", "OPENAI_TOKEN"],
    ),
    ("encryptionKey", &["ENCRYPTION_KEY"]),
    ("dbPath", &["DB_PATH"]),
];

fn first_named<'a>(
    names: &'a [&'a str],
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<(&'a str, String)> {
    names
        .iter()
        .find_map(|name| env(name).map(|value| (*name, value)))
}

/// Fill empty credentials from their named env sources, once, at startup.
///
/// Returns the config plus the source that satisfied each field. Values are
/// never logged, only the source name.
pub fn resolve_credentials(
    mut config: Config,
    env: &dyn Fn(&str) -> Option<String>,
) -> (Config, Vec<(String, CredentialSource)>) {
    let mut sources = Vec::new();

    for (field, names) in CREDENTIAL_SOURCES {
        let slot: &mut String = match *field {
            "encryptionKey" => &mut config.memory.encryption_key,
            "dbPath" => &mut config.memory.db_path,
            provider => match config.providers.get_by_name_mut(provider) {
                Some(p) => &mut p.api_key,
                None => continue,
            },
        };

        // dbPath always has a default; an env var still wins over it
        let has_value = !slot.is_empty() && *field != "dbPath";
        let source = if has_value {
            CredentialSource::Config
        } else if let Some((name, value)) = first_named(names, env) {
            *slot = value;
            CredentialSource::Env(name.to_string())
        } else if !slot.is_empty() {
            CredentialSource::Config
        } else {
            CredentialSource::Missing
        };

        match &source {
            CredentialSource::Env(name) => info!(field = *field, source = %name, "Credential resolved"),
            CredentialSource::Config => debug!(field = *field, "Credential from config"),
            CredentialSource::Missing => debug!(field = *field, "Credential not set"),
        }
        sources.push((field.to_string(), source));
    }

    (config, sources)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn fake_env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.agent.max_iterations, 5);
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "agent": {"maxTokens": 2048},
            "memory": {"pruneThreshold": 40}
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_tokens, 2048);
        assert_eq!(config.memory.prune_threshold, 40);
        assert_eq!(config.agent.temperature, 0.7);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_tokens, 4096);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.agent.role = "coder".to_string();
        config.providers.gemini.api_key = "g-test".to_string();

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.agent.role, "coder");
        assert_eq!(reloaded.providers.gemini.api_key, "g-test");
    }

    #[test]
    fn test_migrate_top_level_memory_keys() {
        let file = write_temp_json(r#"{"dbPath": "/tmp/old.db", "encryptionKey": "abcd"}"#);
        let config = load_config_from_path(file.path());
        assert_eq!(config.memory.db_path, "/tmp/old.db");
        assert_eq!(config.memory.encryption_key, "abcd");
    }

    #[test]
    fn test_migrate_no_overwrite() {
        let file = write_temp_json(
            r#"{"dbPath": "/tmp/old.db", "memory": {"dbPath": "/tmp/new.db"}}"#,
        );
        let config = load_config_from_path(file.path());
        assert_eq!(config.memory.db_path, "/tmp/new.db");
    }

    #[test]
    fn test_env_overrides() {
        let env = fake_env(&[
            ("GRAVCLAW_AGENT__MAX_ITERATIONS", "9"),
            ("GRAVCLAW_AGENT__DEBUG", "1"),
            ("GRAVCLAW_PROVIDERS__OPENAI__API_KEY", "sk-env"),
            ("GRAVCLAW_PROVIDERS__GEMINI__HIGH_MODEL", "gemini-ultra"),
            ("GRAVCLAW_MEMORY__VECTOR_INDEX", "none"),
            ("GRAVCLAW_WORKFLOW__MAX_DELEGATION_DEPTH", "2"),
        ]);
        let config = apply_env_overrides(Config::default(), &env);

        assert_eq!(config.agent.max_iterations, 9);
        assert!(config.agent.debug);
        assert_eq!(config.providers.openai.api_key, "sk-env");
        assert_eq!(config.providers.gemini.high_model.as_deref(), Some("gemini-ultra"));
        assert_eq!(config.memory.vector_index, VectorIndexKind::None);
        assert_eq!(config.workflow.max_delegation_depth, 2);
    }

    #[test]
    fn test_task_list_path_fallback_env() {
        let env = fake_env(&[("TASK_LIST_PATH", "/srv/tasks.md")]);
        let config = apply_env_overrides(Config::default(), &env);
        assert_eq!(config.agent.task_list_path, "/srv/tasks.md");

        let env = fake_env(&[
            ("TASK_LIST_PATH", "/srv/tasks.md"),
            ("GRAVCLAW_AGENT__TASK_LIST_PATH", "/home/me/todo.md"),
        ]);
        let config = apply_env_overrides(Config::default(), &env);
        assert_eq!(config.agent.task_list_path, "/home/me/todo.md");
    }

    #[test]
    fn test_credentials_follow_named_order() {
        let env = fake_env(&[("OR_API_KEY", "third"), ("OPENROUTER_TOKEN", "fourth")]);
        let (config, sources) = resolve_credentials(Config::default(), &env);

        assert_eq!(config.providers.openrouter.api_key, "third");
        assert!(sources.contains(&(
            "openrouter".to_string(),
            CredentialSource::Env("OR_API_KEY".to_string())
        )));
    }

    #[test]
    fn test_credentials_config_wins_over_env() {
        let mut config = Config::default();
        config.providers.openai.api_key = "from-file".into();
        let env = fake_env(&[("OPENAI_API_KEY", "from-env")]);

        let (config, sources) = resolve_credentials(config, &env);
        assert_eq!(config.providers.openai.api_key, "from-file");
        assert!(sources.contains(&("openai".to_string(), CredentialSource::Config)));
    }

    #[test]
    fn test_credentials_missing() {
        let (config, sources) = resolve_credentials(Config::default(), &fake_env(&[]));
        assert!(!config.providers.gemini.is_configured());
        assert!(sources.contains(&("gemini".to_string(), CredentialSource::Missing)));
        // dbPath keeps its default
        assert!(sources.contains(&("dbPath".to_string(), CredentialSource::Config)));
    }

    #[test]
    fn test_db_path_env_beats_default() {
        let env = fake_env(&[("DB_PATH", "/data/memory.db"), ("ENCRYPTION_KEY", "ff")]);
        let (config, _) = resolve_credentials(Config::default(), &env);
        assert_eq!(config.memory.db_path, "/data/memory.db");
        assert_eq!(config.memory.encryption_key, "ff");
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(raw["agent"].get("maxTokens").is_some());
        assert!(raw["agent"].get("max_tokens").is_none());
    }
}
