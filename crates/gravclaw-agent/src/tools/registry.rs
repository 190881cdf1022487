//! Capability registry: the tools the loop advertises to the model and the
//! executor dispatches against, in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use gravclaw_core::types::ToolDefinition;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::Tool;
use crate::executor::ToolError;

/// Tools keyed by name, advertised in the order they were registered.
///
/// Holds `Arc<dyn Tool>` so one tool can sit in the top-level registry and
/// in every sub-agent registry cloned from the same base.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced in place and
    /// keeps its position.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => {
                debug!(tool = tool.name(), "replaced tool");
                self.tools[i] = tool;
            }
            None => {
                debug!(tool = tool.name(), "registered tool");
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Declarations sent with every model call.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Run one tool. An unknown name is reported without invoking anything;
    /// an error from the tool body becomes `ToolError::Failed`.
    pub async fn execute(&self, name: &str, params: HashMap<String, Value>) -> Result<String, ToolError> {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "tool not found");
            return Err(ToolError::NotFound(name.to_string()));
        };

        info!(tool = name, "executing tool");
        tool.execute(params).await.map_err(|e| {
            warn!(tool = name, error = %e, "tool execution failed");
            ToolError::Failed(e.to_string())
        })
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
