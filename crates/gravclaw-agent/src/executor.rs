//! Tool executor: runs one model turn's batch of tool calls concurrently.
//!
//! Results come back in call order, one per call, each tagged with the
//! originating call id. A failing or unknown tool produces an error result
//! for that call only; siblings always run to completion.

use std::collections::HashMap;

use futures::future::join_all;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use gravclaw_core::types::{Message, ToolCall};

use crate::tools::ToolRegistry;

/// Why a single tool call produced no output.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool {0} not found.")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// Outcome of one tool call.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub outcome: Result<String, ToolError>,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Transcript form: output text as-is, errors as `{"error": "..."}`.
    pub fn render(&self) -> String {
        match &self.outcome {
            Ok(output) => output.clone(),
            Err(e) => json!({ "error": e.to_string() }).to_string(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::tool_result(self.call_id.clone(), self.name.clone(), self.render())
    }
}

/// Parse a call's argument string. Models send `""` for no arguments.
pub fn parse_arguments(raw: &str) -> Result<HashMap<String, Value>, ToolError> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(Value::Null) => Ok(HashMap::new()),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}

async fn execute_one(registry: &ToolRegistry, call: &ToolCall) -> ToolResult {
    let name = call.function.name.clone();
    let outcome = match parse_arguments(&call.function.arguments) {
        Ok(params) => registry.execute(&name, params).await,
        Err(e) => Err(e),
    };
    ToolResult {
        call_id: call.id.clone(),
        name,
        outcome,
    }
}

/// Execute every call concurrently and join.
pub async fn execute_all(registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
    debug!(calls = calls.len(), "executing tool batch");
    join_all(calls.iter().map(|call| execute_one(registry, call))).await
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
