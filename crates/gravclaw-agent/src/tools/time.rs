//! `get_current_time`: the agent's only built-in utility tool.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};

use super::base::Tool;

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current time and date."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: HashMap<String, Value>) -> anyhow::Result<String> {
        Ok(Local::now().format("%A, %B %-d, %Y %H:%M:%S %:z").to_string())
    }
}
