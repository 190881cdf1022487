//! `run_workflow` and `resume_workflow`: the model's handles on the
//! workflow engine. Both drive the workflow until it completes or blocks and
//! return a readable summary; engine errors come back as text.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use gravclaw_core::utils::take_chars;

use super::base::{require_i64, require_string, Tool};
use crate::reflector::Reflector;
use crate::workflow::{WorkflowEngine, WorkflowRun};

/// Summary shown after `run_workflow`.
pub fn render_started(run: &WorkflowRun) -> String {
    if let Some(question) = &run.question {
        return format!(
            "### Workflow Paused (ID: {})\n\nI need more information to proceed with the next step:\n\n\
             **{question}**\n\nPlease reply to this message to provide the details and I will resume the workflow.",
            run.id
        );
    }
    let mut text = format!("### Workflow Completed!\nStarting Workflow #{}...\n", run.id);
    for step in &run.finished {
        text.push_str(&format!("\nStep Finished: {}...\n", take_chars(step, 100)));
    }
    text
}

/// Summary shown after `resume_workflow`.
pub fn render_resumed(run: &WorkflowRun) -> String {
    if let Some(question) = &run.question {
        return format!(
            "### Workflow Paused Again (ID: {})\n\nI need even more information:\n\n\
             **{question}**\n\nPlease reply again to continue.",
            run.id
        );
    }
    let mut text = format!("### Workflow Resumed & Completed!\nResuming Workflow #{}...\n", run.id);
    for step in &run.finished {
        text.push_str(&format!("\nStep Resumed & Finished: {}...\n", take_chars(step, 100)));
    }
    text
}

// ─────────────────────────────────────────────
// run_workflow
// ─────────────────────────────────────────────

pub struct RunWorkflowTool {
    engine: Arc<WorkflowEngine>,
}

impl RunWorkflowTool {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for RunWorkflowTool {
    fn name(&self) -> &str {
        "run_workflow"
    }

    fn description(&self) -> &str {
        "Decomposes a complex request into a multi-step plan and executes it step-by-step using \
         specialized agents. Use this for major projects (e.g., \"Build a full landing page\", \
         \"Run a deep SEO audit\")."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "The high-level user request to decompose."
                }
            },
            "required": ["request"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let request = require_string(&params, "request")?;
        match self.engine.start(&request).await {
            Ok(run) => Ok(render_started(&run)),
            Err(e) => {
                warn!(error = %e, "Workflow execution failed");
                Ok(format!("Error in workflow execution: {e}"))
            }
        }
    }
}

// ─────────────────────────────────────────────
// resume_workflow
// ─────────────────────────────────────────────

pub struct ResumeWorkflowTool {
    engine: Arc<WorkflowEngine>,
    reflector: Arc<Reflector>,
}

impl ResumeWorkflowTool {
    pub fn new(engine: Arc<WorkflowEngine>, reflector: Arc<Reflector>) -> Self {
        Self { engine, reflector }
    }
}

#[async_trait]
impl Tool for ResumeWorkflowTool {
    fn name(&self) -> &str {
        "resume_workflow"
    }

    fn description(&self) -> &str {
        "Resumes a blocked workflow with the provided user input. Use this when a workflow is \
         PAUSED and waiting for information."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workflowId": {
                    "type": "number",
                    "description": "The ID of the workflow to resume."
                },
                "input": {
                    "type": "string",
                    "description": "The information provided by the user."
                }
            },
            "required": ["workflowId", "input"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let id = require_i64(&params, "workflowId")?;
        let input = require_string(&params, "input")?;

        let reflector = Arc::clone(&self.reflector);
        let feedback = input.clone();
        tokio::spawn(async move {
            if let Err(e) = reflector.learn_preference(&feedback).await {
                warn!(error = %e, "Preference learning failed");
            }
        });

        match self.engine.resume(id, &input).await {
            Ok(run) => Ok(render_resumed(&run)),
            Err(e) => {
                warn!(workflow = id, error = %e, "Workflow resumption failed");
                Ok(format!("Error in workflow resumption: {e}"))
            }
        }
    }
}
