//! Agent loop: one user turn, from context assembly through the bounded
//! model <-> tool exchange to the final reply.
//!
//! The status command bypasses everything here before memory or the model
//! is touched. All memory writes made on behalf of a turn (the user message,
//! the reply, token usage, intent detection) run as detached tasks; their
//! failures are logged and never reach the caller.

use std::sync::Arc;

use tracing::{debug, info, warn};

use gravclaw_core::config::schema::{AgentConfig, MemoryConfig};
use gravclaw_core::types::{LlmResponse, Message, MessageContent, Role};
use gravclaw_memory::MemoryManager;
use gravclaw_providers::{LlmProvider, LlmRequestConfig, ProviderError};

use crate::context::{add_assistant_message, build_system_prompt, ContextAssembler};
use crate::executor::execute_all;
use crate::proactive::ProactiveMonitor;
use crate::roles::{self, RoleProfile};
use crate::status::StatusReport;
use crate::tools::ToolRegistry;

/// Returned instead of an answer when the iteration bound is hit.
pub const MAX_ITERATIONS_MESSAGE: &str = "Error: Maximum agent loop iterations reached.";

/// Whether `text` is the administrative status command.
pub fn is_status_command(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    t.starts_with("/status") || t == "status"
}

// ─────────────────────────────────────────────
// Tool loop
// ─────────────────────────────────────────────

/// How a tool loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model answered without requesting tools.
    Answer(String),
    /// Every allowed model call asked for more tools.
    Exhausted,
}

impl LoopOutcome {
    pub fn into_text(self) -> String {
        match self {
            LoopOutcome::Answer(text) => text,
            LoopOutcome::Exhausted => MAX_ITERATIONS_MESSAGE.to_string(),
        }
    }
}

/// Record a response's token usage without waiting for the write.
pub(crate) fn record_usage(memory: &Arc<MemoryManager>, provider: &dyn LlmProvider, response: &LlmResponse) {
    let Some(usage) = response.usage.clone() else {
        return;
    };
    let model = response
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());
    let memory = Arc::clone(memory);
    tokio::spawn(async move {
        if let Err(e) = memory
            .log_usage(&model, usage.prompt_tokens, usage.completion_tokens, usage.total_tokens)
            .await
        {
            warn!(error = %e, "Failed to record usage");
        }
    });
}

/// Drive `messages` through at most `max_iterations` model calls, executing
/// requested tools between calls. Tool results are appended to `messages`
/// so the next call sees them.
pub(crate) async fn run_tool_loop(
    provider: &dyn LlmProvider,
    tools: &ToolRegistry,
    messages: &mut Vec<Message>,
    request: &LlmRequestConfig,
    max_iterations: usize,
    usage: Option<&Arc<MemoryManager>>,
) -> Result<LoopOutcome, ProviderError> {
    let definitions = tools.get_definitions();
    let definitions = (!definitions.is_empty()).then_some(definitions.as_slice());

    for iteration in 0..max_iterations {
        debug!(iteration, messages = messages.len(), "LLM call");
        let response = provider.chat(messages, definitions, request).await?;
        if let Some(memory) = usage {
            record_usage(memory, provider, &response);
        }

        if !response.has_tool_calls() {
            return Ok(LoopOutcome::Answer(response.content_or_empty()));
        }

        let calls = response.tool_calls.clone();
        info!(
            iteration,
            tools = ?calls.iter().map(|c| c.function.name.as_str()).collect::<Vec<_>>(),
            "executing tool calls"
        );
        add_assistant_message(messages, response.content, calls.clone());
        for result in execute_all(tools, &calls).await {
            debug!(tool = %result.name, error = result.is_error(), "tool result");
            messages.push(result.to_message());
        }
    }

    warn!(max_iterations, "Agent loop hit its iteration bound");
    Ok(LoopOutcome::Exhausted)
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// Per-agent knobs, usually taken from the config file.
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub role: String,
    pub max_iterations: usize,
    pub request: LlmRequestConfig,
    pub history_limit: usize,
    pub environment: String,
    pub debug: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            role: roles::DEFAULT_ROLE.to_string(),
            max_iterations: 5,
            request: LlmRequestConfig::default(),
            history_limit: 5,
            environment: "development".to_string(),
            debug: false,
        }
    }
}

impl AgentSettings {
    pub fn from_config(agent: &AgentConfig, memory: &MemoryConfig) -> Self {
        Self {
            role: agent.role.clone(),
            max_iterations: agent.max_iterations.max(1) as usize,
            request: LlmRequestConfig {
                max_tokens: agent.max_tokens,
                temperature: agent.temperature,
                ..Default::default()
            },
            history_limit: memory.recent_context_limit,
            environment: agent.environment.clone(),
            debug: agent.debug,
        }
    }
}

/// The top-level agent: one call to `process` is one user turn.
pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    provider_names: Vec<String>,
    memory: Arc<MemoryManager>,
    tools: ToolRegistry,
    context: ContextAssembler,
    proactive: Option<Arc<ProactiveMonitor>>,
    role: &'static RoleProfile,
    settings: AgentSettings,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        memory: Arc<MemoryManager>,
        tools: ToolRegistry,
        settings: AgentSettings,
    ) -> Self {
        let role = roles::role(&settings.role);
        let context = ContextAssembler::new(Arc::clone(&memory), settings.history_limit);
        info!(
            role = role.id,
            tools = tools.len(),
            max_iterations = settings.max_iterations,
            "agent loop initialized"
        );
        Self {
            provider_names: vec![provider.display_name().to_string()],
            provider,
            memory,
            tools,
            context,
            proactive: None,
            role,
            settings,
        }
    }

    /// Enable intent detection on every incoming message.
    pub fn with_proactive(mut self, proactive: Arc<ProactiveMonitor>) -> Self {
        self.proactive = Some(proactive);
        self
    }

    /// Names shown by the status command, in failover order.
    pub fn with_provider_names(mut self, names: Vec<String>) -> Self {
        self.provider_names = names;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn role(&self) -> &'static RoleProfile {
        self.role
    }

    /// Status report, collected without entering the loop.
    pub async fn status(&self) -> String {
        StatusReport::collect(&self.memory, &self.provider_names, &self.settings.environment)
            .await
            .to_string()
    }

    /// Plain-text shorthand for `process`.
    pub async fn process_text(&self, text: &str) -> String {
        self.process(MessageContent::Text(text.to_string())).await
    }

    /// Run one user turn. Never fails: provider errors come back as text.
    pub async fn process(&self, content: MessageContent) -> String {
        let user_text = content.text();
        if is_status_command(&user_text) {
            info!("Status command, bypassing the loop");
            return self.status().await;
        }

        self.log_detached(Role::User, content.clone());
        if let Some(proactive) = &self.proactive {
            let proactive = Arc::clone(proactive);
            let text = user_text.clone();
            tokio::spawn(async move { proactive.detect_intent(&text).await });
        }

        let context = self.context.assemble(&user_text).await;
        let system_prompt = build_system_prompt(&self.role.system_prompt(), &context);
        if self.settings.debug {
            info!(
                system_chars = system_prompt.len(),
                history = context.history.len(),
                facts = context.facts.len(),
                "Prompt assembled"
            );
        }

        let mut messages = vec![
            Message::system(system_prompt),
            Message::User { content },
        ];

        let outcome = run_tool_loop(
            self.provider.as_ref(),
            &self.tools,
            &mut messages,
            &self.settings.request,
            self.settings.max_iterations,
            Some(&self.memory),
        )
        .await;

        match outcome {
            Ok(LoopOutcome::Answer(text)) => {
                if !text.trim().is_empty() {
                    self.log_detached(Role::Assistant, MessageContent::Text(text.clone()));
                }
                text
            }
            Ok(LoopOutcome::Exhausted) => MAX_ITERATIONS_MESSAGE.to_string(),
            Err(e) => {
                warn!(error = %e, "Turn failed");
                format!("I encountered an error: {e}")
            }
        }
    }

    fn log_detached(&self, role: Role, content: MessageContent) {
        let memory = Arc::clone(&self.memory);
        tokio::spawn(async move {
            if let Err(e) = memory.log_message(role, &content, None).await {
                warn!(role = %role, error = %e, "Failed to log message");
            }
        });
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
