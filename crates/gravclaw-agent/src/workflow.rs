//! Workflow engine: decompose a request into a persisted multi-step plan and
//! drive it one step at a time through role-specialized sub-agents.
//!
//! ```text
//! planned -> active <-> blocked
//!              |
//!              +-> completed      (any step error -> failed)
//! ```
//!
//! Every step's output is appended to the workflow's `result`, which later
//! steps receive as their collaborative blackboard. Each step gets exactly
//! one review; a `FIX:` verdict retries the step once with the feedback.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use gravclaw_core::types::{Message, ModelTier};
use gravclaw_core::utils::{extract_json, take_chars};
use gravclaw_memory::store::now_timestamp;
use gravclaw_memory::{MemoryManager, PersistenceError};
use gravclaw_providers::{LlmProvider, LlmRequestConfig, ProviderError};

use crate::reflector::Reflector;
use crate::roles::{self, REQUEST_USER_INPUT};
use crate::subagent::SubagentManager;

const COMPLETED_TEXT: &str = "Workflow completed.";
const WAITING_PREFIX: &str = "WAITING_FOR_USER:";
const FIX_PREFIX: &str = "FIX:";

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(i64),

    #[error("Could not create a plan: {0}")]
    Plan(String),

    #[error("Step {step} failed: {message}")]
    Step { step: usize, message: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Workflow {0} has failed and cannot continue")]
    Failed(i64),

    #[error("Workflow {id} is {status}, not waiting for user input")]
    NotBlocked { id: i64, status: WorkflowStatus },
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(e: rusqlite::Error) -> Self {
        WorkflowError::Persistence(PersistenceError::Query(e))
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        WorkflowError::Persistence(PersistenceError::from(e))
    }
}

fn step_error(index: usize, e: ProviderError) -> WorkflowError {
    WorkflowError::Step {
        step: index + 1,
        message: e.to_string(),
    }
}

// ─────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowStatus {
    Planned,
    Active,
    Blocked,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Planned => "planned",
            WorkflowStatus::Active => "active",
            WorkflowStatus::Blocked => "blocked",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "planned" => WorkflowStatus::Planned,
            "active" => WorkflowStatus::Active,
            "blocked" => WorkflowStatus::Blocked,
            "completed" => WorkflowStatus::Completed,
            "failed" => WorkflowStatus::Failed,
            other => return Err(format!("unknown workflow status: {other}")),
        })
    }
}

fn default_role() -> String {
    roles::DEFAULT_ROLE.to_string()
}

/// One unit of work assigned to a role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub id: u32,
    pub description: String,
    #[serde(rename = "trait", alias = "role", default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

/// The planner's reply: a named plan, or just the steps.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlanDocument {
    Named {
        #[serde(default)]
        name: Option<String>,
        steps: Vec<PlanStep>,
    },
    Steps(Vec<PlanStep>),
}

/// Parse the planner's reply into a workflow name and its steps.
pub fn parse_plan(raw: &str) -> Result<(String, Vec<PlanStep>), WorkflowError> {
    let doc: PlanDocument = serde_json::from_str(extract_json(raw))
        .map_err(|e| WorkflowError::Plan(format!("invalid plan JSON: {e}")))?;
    let (name, steps) = match doc {
        PlanDocument::Named { name, steps } => (name, steps),
        PlanDocument::Steps(steps) => (None, steps),
    };
    if steps.is_empty() {
        return Err(WorkflowError::Plan("the plan has no steps".into()));
    }
    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Untitled Workflow".to_string());
    Ok((name, steps))
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowRecord {
    pub id: i64,
    pub name: String,
    pub status: WorkflowStatus,
    pub plan: Vec<PlanStep>,
    /// Index of the next step to run.
    pub current_step: usize,
    /// Accumulated step outputs; the blackboard for later steps.
    pub result: String,
    pub created_at: String,
    pub updated_at: String,
}

type RawWorkflow = (i64, String, String, String, i64, String, String, String);

fn raw_workflow(row: &Row<'_>) -> rusqlite::Result<RawWorkflow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

/// What one call to `execute_next_step` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// A step ran; carries its output.
    Finished(String),
    /// The step asked the user a question; the workflow is blocked.
    WaitingForUser(String),
    /// No steps remain.
    WorkflowCompleted,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Finished(result) => f.write_str(result),
            StepOutcome::WaitingForUser(question) => write!(f, "{WAITING_PREFIX} {question}"),
            StepOutcome::WorkflowCompleted => f.write_str(COMPLETED_TEXT),
        }
    }
}

/// Steps run by `run_to_pause` before it stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowRun {
    pub id: i64,
    pub finished: Vec<String>,
    /// Set when the run stopped on a question instead of completing.
    pub question: Option<String>,
}

// ─────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────

fn planning_prompt(task: &str, lessons: &[String]) -> String {
    let best_practices = if lessons.is_empty() {
        String::new()
    } else {
        format!(
            "\nGleaned Best Practices & Preferences:\n- {}",
            lessons.join("\n- ")
        )
    };
    format!(
        "You are a Project Manager. Decompose the following user request into a multi-step plan \
         for specialized agents.\n\
         User Request: {task}\n\
         {best_practices}\n\n\
         Available Traits:\n{}\n\n\
         Return a JSON object describing the plan:\n\
         {{\n  \"name\": \"Project Name\",\n  \"steps\": [\n    \
         {{ \"id\": 1, \"description\": \"Specific task for this step\", \"trait\": \"researcher\", \"dependencies\": [] }}\n  \
         ]\n}}\n\n\
         DO NOT include any filler text. Only valid JSON.",
        roles::catalogue()
    )
}

fn review_prompt(step: &PlanStep, result: &str) -> String {
    format!(
        "You are a Quality Assurance Reviewer for Gravclaw.\n\
         Analyze the following result from a sub-agent ({}) for the task: \"{}\"\n\n\
         SUB-AGENT RESULT:\n{result}\n\n\
         Is this result sufficient, accurate, and complete based on the task description?\n\
         If YES, return \"VALID\".\n\
         If NO, return \"FIX: [specific instructions for the sub-agent on how to improve]\".",
        step.role, step.description
    )
}

// ─────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────

pub struct WorkflowEngine {
    provider: Arc<dyn LlmProvider>,
    memory: Arc<MemoryManager>,
    subagents: Arc<SubagentManager>,
    reflector: Arc<Reflector>,
    /// Planning and review run on the high tier.
    request: LlmRequestConfig,
}

impl WorkflowEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        memory: Arc<MemoryManager>,
        subagents: Arc<SubagentManager>,
        reflector: Arc<Reflector>,
        request: LlmRequestConfig,
    ) -> Self {
        Self {
            provider,
            memory,
            subagents,
            reflector,
            request: request.with_tier(ModelTier::High),
        }
    }

    async fn complete(&self, prompt: String) -> Result<String, ProviderError> {
        let response = self
            .provider
            .chat(&[Message::user(prompt)], None, &self.request)
            .await?;
        Ok(response.content_or_empty().trim().to_string())
    }

    /// Plan `task` and persist it as `planned`. Returns the workflow id.
    pub async fn create_plan(&self, task: &str) -> Result<i64, WorkflowError> {
        let lessons = match self.memory.strategic_lessons().await {
            Ok(lessons) => lessons,
            Err(e) => {
                warn!(error = %e, "Planning without strategic lessons");
                Vec::new()
            }
        };
        let raw = self
            .complete(planning_prompt(task, &lessons))
            .await
            .map_err(|e| WorkflowError::Plan(e.to_string()))?;
        let (name, steps) = parse_plan(&raw)?;
        let plan = serde_json::to_string(&steps)?;

        let now = now_timestamp();
        let id = {
            let conn = self.memory.db().conn().await;
            conn.execute(
                "INSERT INTO workflows (name, status, plan, current_step, result, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, '', ?4, ?4)",
                params![name, WorkflowStatus::Planned.as_str(), plan, now],
            )?;
            conn.last_insert_rowid()
        };
        info!(workflow = id, name = %name, steps = steps.len(), "Workflow planned");
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<WorkflowRecord, WorkflowError> {
        let row = {
            let conn = self.memory.db().conn().await;
            conn.query_row(
                "SELECT id, name, status, plan, current_step, result, created_at, updated_at
                 FROM workflows WHERE id = ?1",
                params![id],
                raw_workflow,
            )
            .optional()?
        };
        let Some((id, name, status, plan, current_step, result, created_at, updated_at)) = row else {
            return Err(WorkflowError::NotFound(id));
        };
        Ok(WorkflowRecord {
            id,
            name,
            status: status
                .parse()
                .map_err(PersistenceError::Codec)?,
            plan: serde_json::from_str(&plan)?,
            current_step: current_step.max(0) as usize,
            result,
            created_at,
            updated_at,
        })
    }

    /// Most recent workflows, newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<WorkflowRecord>, WorkflowError> {
        let ids: Vec<i64> = {
            let conn = self.memory.db().conn().await;
            let mut stmt = conn.prepare("SELECT id FROM workflows ORDER BY id DESC LIMIT ?1")?;
            let rows = stmt.query_map(params![limit as i64], |r| r.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.get(id).await?);
        }
        Ok(records)
    }

    async fn set_status(&self, id: i64, status: WorkflowStatus) -> Result<(), WorkflowError> {
        let conn = self.memory.db().conn().await;
        conn.execute(
            "UPDATE workflows SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_timestamp(), id],
        )?;
        Ok(())
    }

    async fn save_progress(
        &self,
        id: i64,
        current_step: usize,
        status: WorkflowStatus,
        result: &str,
    ) -> Result<(), WorkflowError> {
        let conn = self.memory.db().conn().await;
        conn.execute(
            "UPDATE workflows SET current_step = ?1, status = ?2, result = ?3, updated_at = ?4
             WHERE id = ?5",
            params![current_step as i64, status.as_str(), result, now_timestamp(), id],
        )?;
        Ok(())
    }

    /// Run the step at `current_step`, or complete the workflow when none
    /// remain. `user_input` answers the question a blocked step asked.
    pub async fn execute_next_step(
        &self,
        id: i64,
        user_input: Option<&str>,
    ) -> Result<StepOutcome, WorkflowError> {
        let workflow = self.get(id).await?;
        match workflow.status {
            WorkflowStatus::Completed => return Ok(StepOutcome::WorkflowCompleted),
            WorkflowStatus::Failed => return Err(WorkflowError::Failed(id)),
            _ => {}
        }

        let Some(step) = workflow.plan.get(workflow.current_step).cloned() else {
            self.set_status(id, WorkflowStatus::Completed).await?;
            info!(workflow = id, "Workflow completed");
            let reflector = Arc::clone(&self.reflector);
            let finished = WorkflowRecord {
                status: WorkflowStatus::Completed,
                ..workflow
            };
            tokio::spawn(async move {
                if let Err(e) = reflector.reflect(&finished).await {
                    warn!(workflow = finished.id, error = %e, "Reflection failed");
                }
            });
            return Ok(StepOutcome::WorkflowCompleted);
        };

        self.set_status(id, WorkflowStatus::Active).await?;
        match self.run_step(&workflow, &step, user_input).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(workflow = id, step = workflow.current_step + 1, error = %e, "Workflow step failed");
                if let Err(mark) = self.set_status(id, WorkflowStatus::Failed).await {
                    warn!(workflow = id, error = %mark, "Could not mark workflow failed");
                }
                Err(e)
            }
        }
    }

    async fn run_step(
        &self,
        workflow: &WorkflowRecord,
        step: &PlanStep,
        user_input: Option<&str>,
    ) -> Result<StepOutcome, WorkflowError> {
        let index = workflow.current_step;
        let task = match user_input {
            Some(input) => format!("{}\n\nUSER PROVIDED INPUT: {input}", step.description),
            None => step.description.clone(),
        };
        let blackboard = Some(workflow.result.as_str());
        let budget = self.subagents.root_budget();
        debug!(workflow = workflow.id, step = index + 1, role = %step.role, "Running step");

        let mut result = self
            .subagents
            .run(&task, &step.role, blackboard, budget)
            .await
            .map_err(|e| step_error(index, e))?;

        if !result.trim_start().starts_with(REQUEST_USER_INPUT) {
            let verdict = self
                .complete(review_prompt(step, &result))
                .await
                .map_err(|e| step_error(index, e))?;
            if let Some(feedback) = verdict.strip_prefix(FIX_PREFIX) {
                let feedback = feedback.trim();
                info!(workflow = workflow.id, step = index + 1, feedback = %take_chars(feedback, 100), "Course correction");
                let retry = format!(
                    "{task}\n\nFEEDBACK FROM REVIEWER: {feedback}\n\
                     PLEASE FIX YOUR PREVIOUS RESPONSE AND PROVIDE A HIGHER QUALITY RESULT."
                );
                result = self
                    .subagents
                    .run(&retry, &step.role, blackboard, budget)
                    .await
                    .map_err(|e| step_error(index, e))?;
            }
        }

        if let Some(question) = result.trim_start().strip_prefix(REQUEST_USER_INPUT) {
            let question = question.trim().to_string();
            let blocked = format!(
                "{}\n\n### Step {} (BLOCKED): {}\nQuestion: {question}",
                workflow.result,
                index + 1,
                step.role
            );
            self.save_progress(workflow.id, index, WorkflowStatus::Blocked, &blocked)
                .await?;
            info!(workflow = workflow.id, step = index + 1, "Workflow blocked on user input");
            return Ok(StepOutcome::WaitingForUser(question));
        }

        let accumulated = format!(
            "{}\n\n### Step {}: {}\n{result}",
            workflow.result,
            index + 1,
            step.role
        );
        self.save_progress(workflow.id, index + 1, WorkflowStatus::Active, &accumulated)
            .await?;
        Ok(StepOutcome::Finished(result))
    }

    /// Drive steps until the workflow completes or blocks. `input` is given
    /// to the first step only.
    pub async fn run_to_pause(&self, id: i64, input: Option<&str>) -> Result<WorkflowRun, WorkflowError> {
        let mut input = input;
        let mut finished = Vec::new();
        loop {
            match self.execute_next_step(id, input.take()).await? {
                StepOutcome::Finished(result) => finished.push(result),
                StepOutcome::WaitingForUser(question) => {
                    return Ok(WorkflowRun {
                        id,
                        finished,
                        question: Some(question),
                    })
                }
                StepOutcome::WorkflowCompleted => {
                    return Ok(WorkflowRun {
                        id,
                        finished,
                        question: None,
                    })
                }
            }
        }
    }

    /// Answer a blocked workflow's question and keep going. Any other
    /// status is rejected without touching the workflow.
    pub async fn resume(&self, id: i64, input: &str) -> Result<WorkflowRun, WorkflowError> {
        let record = self.get(id).await?;
        if record.status != WorkflowStatus::Blocked {
            return Err(WorkflowError::NotBlocked {
                id,
                status: record.status,
            });
        }
        self.run_to_pause(id, Some(input)).await
    }

    /// Plan `request` and run it until it completes or blocks.
    pub async fn start(&self, request: &str) -> Result<WorkflowRun, WorkflowError> {
        let id = self.create_plan(request).await?;
        self.run_to_pause(id, None).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
