//! Reflector: turns finished work and user feedback into long-term facts.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use gravclaw_core::types::Message;
use gravclaw_core::utils::take_chars;
use gravclaw_memory::{FactKind, MemoryManager, MemoryResult};
use gravclaw_providers::{LlmProvider, LlmRequestConfig};

use crate::workflow::{WorkflowRecord, WorkflowStatus};

const LESSON_SEPARATOR: &str = "---";
const MIN_LESSON_CHARS: usize = 20;
const MIN_FEEDBACK_CHARS: usize = 10;
const MIN_PREFERENCE_CHARS: usize = 5;

fn reflection_prompt(workflow: &WorkflowRecord) -> String {
    format!(
        "You are a Meta-Cognitive Analyst for Gravclaw.\n\
         Analyze the following completed workflow and extract \"Strategic Lessons\".\n\n\
         Workflow Name: {}\n\
         Full Result:\n{}\n\n\
         Extract the following in a concise summary:\n\
         1. SUCCESSFUL PATTERNS: What tool sequences or agent hand-offs worked well?\n\
         2. USER PREFERENCES: What did we learn about how the user wants things done?\n\
         3. OPTIMIZATION: How can we do this faster or better next time?\n\n\
         Format each lesson as a single, stand-alone \"Fact\" that can be stored in long-term memory.\n\
         Separate lessons with '---'.",
        workflow.name, workflow.result
    )
}

fn preference_prompt(input: &str) -> String {
    format!(
        "Analyze the following user input for communication preferences or procedural instructions.\n\
         User Input: \"{input}\"\n\n\
         If this input contains a preference (e.g., \"Keep it short\", \"Use more data\", \"I don't like emojis\"), \
         extract it as a stand-alone fact.\n\
         If it is just data (e.g., \"The URL is example.com\"), ignore it.\n\n\
         Return ONLY the extracted preference as a string, or \"NONE\"."
    )
}

pub struct Reflector {
    memory: Arc<MemoryManager>,
    provider: Arc<dyn LlmProvider>,
}

impl Reflector {
    pub fn new(memory: Arc<MemoryManager>, provider: Arc<dyn LlmProvider>) -> Self {
        Self { memory, provider }
    }

    async fn complete(&self, prompt: String) -> MemoryResult<String> {
        let response = self
            .provider
            .chat(&[Message::user(prompt)], None, &LlmRequestConfig::default())
            .await?;
        Ok(response.content_or_empty().trim().to_string())
    }

    /// Store strategic lessons from a completed workflow. Returns how many
    /// were stored; other statuses are ignored.
    pub async fn reflect(&self, workflow: &WorkflowRecord) -> MemoryResult<usize> {
        if workflow.status != WorkflowStatus::Completed {
            debug!(workflow = workflow.id, status = %workflow.status, "Skipping reflection");
            return Ok(0);
        }
        info!(workflow = workflow.id, "Reflecting on workflow");

        let raw = self.complete(reflection_prompt(workflow)).await?;
        let mut stored = 0;
        for lesson in raw.split(LESSON_SEPARATOR).map(str::trim) {
            if lesson.chars().count() <= MIN_LESSON_CHARS {
                continue;
            }
            self.memory
                .store_fact(
                    lesson,
                    None,
                    FactKind::StrategicLesson,
                    Some(json!({ "workflowId": workflow.id, "workflowName": workflow.name })),
                )
                .await?;
            debug!(lesson = %take_chars(lesson, 50), "Learned lesson");
            stored += 1;
        }
        info!(workflow = workflow.id, lessons = stored, "Reflection complete");
        Ok(stored)
    }

    /// Store a user preference found in `input`, if any. Returns the fact id.
    pub async fn learn_preference(&self, input: &str) -> MemoryResult<Option<i64>> {
        if input.chars().count() < MIN_FEEDBACK_CHARS {
            return Ok(None);
        }
        let preference = self.complete(preference_prompt(input)).await?;
        if preference == "NONE" || preference.chars().count() <= MIN_PREFERENCE_CHARS {
            return Ok(None);
        }
        let id = self
            .memory
            .store_fact(&preference, None, FactKind::UserPreference, None)
            .await?;
        info!(preference = %preference, "Learned preference");
        Ok(Some(id))
    }
}
