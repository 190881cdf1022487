//! Tool trait: the call contract every capability exposed to the model
//! implements, plus parameter helpers.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use gravclaw_core::types::ToolDefinition;

/// A capability the model can call by name.
///
/// The executor runs a whole batch concurrently, so `execute` may be entered
/// from several tasks at once. An `Err` becomes the error payload of that one
/// call; the rest of the batch is unaffected.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls, e.g. `"run_workflow"`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema object: `{"type": "object", "properties": ..., "required": ...}`.
    fn parameters(&self) -> Value;

    /// Output is fed back to the model verbatim.
    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

// Argument helpers. Their error texts reach the model as tool output.

/// A required string argument.
pub fn require_string(params: &HashMap<String, Value>, key: &str) -> anyhow::Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// An optional string argument; non-strings count as absent.
pub fn optional_string(params: &HashMap<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// A required integer. Models often send ids as `"12"` or `"#12"`, both accepted.
pub fn require_i64(params: &HashMap<String, Value>, key: &str) -> anyhow::Result<i64> {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| anyhow::anyhow!("Parameter {key} must be an integer")),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches('#')
            .parse()
            .map_err(|_| anyhow::anyhow!("Parameter {key} must be an integer, got {s:?}")),
        _ => Err(anyhow::anyhow!("Missing required parameter: {key}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_require_string() {
        let params = args(&[("request", json!("audit example.com")), ("count", json!(42))]);
        assert_eq!(require_string(&params, "request").unwrap(), "audit example.com");
        assert!(require_string(&params, "count").is_err());
        assert_eq!(
            require_string(&params, "task").unwrap_err().to_string(),
            "Missing required parameter: task"
        );
    }

    #[test]
    fn test_optional_string() {
        let params = args(&[("instructions", json!("cite sources")), ("trait", json!(null))]);
        assert_eq!(optional_string(&params, "instructions"), Some("cite sources".into()));
        assert_eq!(optional_string(&params, "trait"), None);
        assert_eq!(optional_string(&params, "other"), None);
    }

    #[test]
    fn test_require_i64_accepts_numbers_and_strings() {
        let id = |v: Value| require_i64(&args(&[("workflowId", v)]), "workflowId");
        assert_eq!(id(json!(7)).unwrap(), 7);
        assert_eq!(id(json!(7.0)).unwrap(), 7);
        assert_eq!(id(json!(" #12 ")).unwrap(), 12);
        assert!(id(json!("twelve")).is_err());
        assert!(id(json!(1.5)).is_err());
        assert!(require_i64(&HashMap::new(), "workflowId").is_err());
    }

    #[test]
    fn test_to_definition_wraps_schema() {
        struct Lookup;

        #[async_trait]
        impl Tool for Lookup {
            fn name(&self) -> &str {
                "lookup_fact"
            }
            fn description(&self) -> &str {
                "Search stored facts"
            }
            fn parameters(&self) -> Value {
                json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                })
            }
            async fn execute(&self, _params: HashMap<String, Value>) -> anyhow::Result<String> {
                Ok(String::new())
            }
        }

        let def = Lookup.to_definition();
        assert_eq!(def.tool_type, "function");
        assert_eq!(def.function.name, "lookup_fact");
        assert_eq!(def.function.description, "Search stored facts");
        assert_eq!(def.function.parameters["required"], json!(["query"]));
    }
}
