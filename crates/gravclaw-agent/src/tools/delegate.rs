//! `delegate_task`: hand a sub-task to a role-specialized sub-agent and wait
//! for its answer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{optional_string, require_string, Tool};
use crate::roles;
use crate::subagent::{RecursionBudget, SubagentManager};

/// Bound to the recursion level of the agent that owns it.
pub struct DelegateTool {
    manager: Arc<SubagentManager>,
    budget: RecursionBudget,
    description: String,
}

impl DelegateTool {
    pub fn new(manager: Arc<SubagentManager>, budget: RecursionBudget) -> Self {
        let description = format!(
            "Delegate a specific sub-task to a specialized agent and wait for its result. \
             Available traits: {}.",
            roles::role_ids().join(", ")
        );
        Self {
            manager,
            budget,
            description,
        }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate_task"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The specific task to delegate"
                },
                "trait": {
                    "type": "string",
                    "enum": roles::role_ids(),
                    "description": "The specialized role that should handle the task"
                },
                "instructions": {
                    "type": "string",
                    "description": "Optional extra guidance for the sub-agent"
                }
            },
            "required": ["task", "trait"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let task = require_string(&params, "task")?;
        let role = require_string(&params, "trait")?;
        let instructions = optional_string(&params, "instructions");
        Ok(self
            .manager
            .delegate(&task, &role, instructions.as_deref(), self.budget)
            .await)
    }
}
