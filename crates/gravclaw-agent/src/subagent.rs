//! Sub-agents: role-specialized, short-lived agents for one delegated task.
//!
//! A sub-agent gets the role's system prompt (plus an optional blackboard of
//! earlier findings), a single `TASK:` user message, the efficient model
//! tier and the same bounded tool loop as the top-level agent. Its registry
//! carries its own `delegate_task` tool one level deeper, so nesting stops
//! at the configured depth.

use std::sync::Arc;

use tracing::{info, warn};

use gravclaw_core::types::{Message, ModelTier, Role};
use gravclaw_core::utils::take_chars;
use gravclaw_memory::MemoryManager;
use gravclaw_providers::{LlmProvider, LlmRequestConfig, ProviderError};

use crate::agent_loop::run_tool_loop;
use crate::roles;
use crate::tools::delegate::DelegateTool;
use crate::tools::ToolRegistry;

/// Returned to a sub-agent that tries to delegate past the limit.
pub const DEPTH_LIMIT_MESSAGE: &str =
    "ERROR: Maximum delegation depth reached. Please consolidate and return what you have.";

// ─────────────────────────────────────────────
// RecursionBudget
// ─────────────────────────────────────────────

/// How deep a delegation chain already is, and how deep it may go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecursionBudget {
    depth: u32,
    max_depth: u32,
}

impl RecursionBudget {
    /// Budget for work started by the top-level agent or a workflow.
    pub fn root(max_depth: u32) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// No further delegation is allowed from this level.
    pub fn is_exhausted(&self) -> bool {
        self.depth >= self.max_depth
    }

    pub fn deeper(&self) -> Self {
        Self {
            depth: self.depth + 1,
            max_depth: self.max_depth,
        }
    }
}

// ─────────────────────────────────────────────
// SubagentManager
// ─────────────────────────────────────────────

/// Shared by the delegate tool, the workflow engine and proactive research.
pub struct SubagentManager {
    provider: Arc<dyn LlmProvider>,
    memory: Arc<MemoryManager>,
    /// Tools every sub-agent gets besides `delegate_task`.
    base_tools: ToolRegistry,
    request: LlmRequestConfig,
    max_iterations: usize,
    max_depth: u32,
}

impl SubagentManager {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        memory: Arc<MemoryManager>,
        base_tools: ToolRegistry,
        request: LlmRequestConfig,
        max_iterations: usize,
        max_depth: u32,
    ) -> Self {
        Self {
            provider,
            memory,
            base_tools,
            request: request.with_tier(ModelTier::Efficient),
            max_iterations,
            max_depth,
        }
    }

    pub fn root_budget(&self) -> RecursionBudget {
        RecursionBudget::root(self.max_depth)
    }

    /// System and user messages for one sub-agent run.
    pub fn build_messages(
        role_id: &str,
        task: &str,
        blackboard: Option<&str>,
        depth: u32,
    ) -> Vec<Message> {
        let mut system = roles::role(role_id).system_prompt();
        if let Some(board) = blackboard.filter(|b| !b.trim().is_empty()) {
            system.push_str("\n\nCOLLABORATIVE BLACKBOARD (Previous Findings):\n");
            system.push_str(board);
        }
        if depth > 0 {
            system.push_str(&format!("\n(Delegation Depth: {depth})"));
        }
        vec![
            Message::system(system),
            Message::user(format!(
                "TASK: {task}\n\nYour goal is to complete this specific task and return the final \
                 finding or output. Do not engage in conversational filler."
            )),
        ]
    }

    /// Run one sub-agent to completion. Provider failures propagate.
    pub async fn run(
        self: &Arc<Self>,
        task: &str,
        role_id: &str,
        blackboard: Option<&str>,
        budget: RecursionBudget,
    ) -> Result<String, ProviderError> {
        let role = roles::role(role_id);
        info!(
            role = role.id,
            depth = budget.depth(),
            task = %take_chars(task, 50),
            "Spawning sub-agent"
        );

        let mut tools = self.base_tools.clone();
        tools.register(Arc::new(DelegateTool::new(Arc::clone(self), budget)));

        let mut messages = Self::build_messages(role.id, task, blackboard, budget.depth());
        let outcome = run_tool_loop(
            self.provider.as_ref(),
            &tools,
            &mut messages,
            &self.request,
            self.max_iterations,
            Some(&self.memory),
        )
        .await?;
        let result = outcome.into_text();

        let memory = Arc::clone(&self.memory);
        let note = format!(
            "Sub-agent ({}) completed task: {}...",
            role.name,
            take_chars(task, 50)
        );
        tokio::spawn(async move {
            if let Err(e) = memory.log_text(Role::System, &note).await {
                warn!(error = %e, "Failed to log sub-agent completion");
            }
        });

        Ok(result)
    }

    /// Like `run`, but failures come back as text for the caller's model.
    pub async fn spawn(
        self: &Arc<Self>,
        task: &str,
        role_id: &str,
        blackboard: Option<&str>,
        budget: RecursionBudget,
    ) -> String {
        match self.run(task, role_id, blackboard, budget).await {
            Ok(result) => result,
            Err(e) => {
                warn!(role = role_id, error = %e, "Sub-agent failed");
                format!("Error: Sub-agent execution failed: {e}")
            }
        }
    }

    /// Delegate from an agent running at `budget` to a sub-agent one level
    /// deeper.
    pub async fn delegate(
        self: &Arc<Self>,
        task: &str,
        role_id: &str,
        instructions: Option<&str>,
        budget: RecursionBudget,
    ) -> String {
        if budget.is_exhausted() {
            warn!(depth = budget.depth(), "Delegation refused at depth limit");
            return DEPTH_LIMIT_MESSAGE.to_string();
        }

        let task = match instructions.filter(|i| !i.trim().is_empty()) {
            Some(extra) => format!("{task}\n\nSPECIAL INSTRUCTIONS FROM PARENT AGENT:\n{extra}"),
            None => task.to_string(),
        };
        match self.run(&task, role_id, None, budget.deeper()).await {
            Ok(result) => format!("DELEGATION_RESULT from {role_id}:\n{result}"),
            Err(e) => format!("DELEGATION_ERROR: {e}"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::MAX_ITERATIONS_MESSAGE;
    use crate::test_support::{calls, eventually, memory, text, ScriptedLlm};

    fn manager(llm: Arc<ScriptedLlm>, max_depth: u32) -> Arc<SubagentManager> {
        Arc::new(SubagentManager::new(
            llm,
            memory(),
            ToolRegistry::new(),
            LlmRequestConfig::default(),
            5,
            max_depth,
        ))
    }

    #[test]
    fn test_budget_levels() {
        let root = RecursionBudget::root(3);
        assert_eq!(root.depth(), 0);
        assert!(!root.is_exhausted());
        let third = root.deeper().deeper().deeper();
        assert_eq!(third.depth(), 3);
        assert!(third.is_exhausted());
        assert!(RecursionBudget::root(0).is_exhausted());
    }

    #[test]
    fn test_messages_without_blackboard() {
        let msgs = SubagentManager::build_messages("coder", "fix the build", None, 0);
        assert_eq!(msgs.len(), 2);
        let system = msgs[0].text();
        assert!(system.starts_with("You are an expert Senior Software Engineer."));
        assert!(!system.contains("(Previous Findings)"));
        assert!(!system.contains("Delegation Depth"));
        assert!(msgs[1].text().starts_with("TASK: fix the build\n\nYour goal is"));
    }

    #[test]
    fn test_messages_with_blackboard_and_depth() {
        let msgs = SubagentManager::build_messages("researcher", "t", Some("### Step 1: found X"), 2);
        let system = msgs[0].text();
        assert!(system.contains("COLLABORATIVE BLACKBOARD (Previous Findings):\n### Step 1: found X"));
        assert!(system.ends_with("(Delegation Depth: 2)"));
    }

    #[tokio::test]
    async fn test_run_uses_efficient_tier_and_logs() {
        let llm = ScriptedLlm::new(vec![text("finding")]);
        let mgr = manager(llm.clone(), 3);

        let result = mgr.run("find X", "researcher", None, mgr.root_budget()).await.unwrap();
        assert_eq!(result, "finding");
        assert_eq!(llm.tier(0), ModelTier::Efficient);
        // Sub-agents always carry the delegate tool.
        assert!(llm.had_tools(0));

        let mem = Arc::clone(&mgr.memory);
        assert!(eventually(|| async { mem.message_count().await.unwrap() == 1 }).await);
        let history = mem.recent_context(1).await.unwrap();
        assert_eq!(history[0].role, Role::System);
        assert_eq!(
            history[0].content,
            "Sub-agent (Deep Researcher) completed task: find X..."
        );
    }

    #[tokio::test]
    async fn test_spawn_wraps_provider_failure() {
        let mgr = manager(ScriptedLlm::failing(), 3);
        let out = mgr.spawn("t", "coder", None, mgr.root_budget()).await;
        assert!(out.starts_with("Error: Sub-agent execution failed: All LLM providers failed"));
    }

    #[tokio::test]
    async fn test_delegate_formats_result_and_instructions() {
        let llm = ScriptedLlm::new(vec![text("42")]);
        let mgr = manager(llm.clone(), 3);

        let out = mgr
            .delegate("compute", "coder", Some("use integers"), mgr.root_budget())
            .await;
        assert_eq!(out, "DELEGATION_RESULT from coder:\n42");

        let sent = llm.call(0);
        assert!(sent[0].text().ends_with("(Delegation Depth: 1)"));
        assert!(sent[1]
            .text()
            .starts_with("TASK: compute\n\nSPECIAL INSTRUCTIONS FROM PARENT AGENT:\nuse integers"));
    }

    #[tokio::test]
    async fn test_delegate_error_is_text() {
        let mgr = manager(ScriptedLlm::failing(), 3);
        let out = mgr.delegate("t", "seo", None, mgr.root_budget()).await;
        assert!(out.starts_with("DELEGATION_ERROR: "));
    }

    #[tokio::test]
    async fn test_delegate_at_limit_never_calls_model() {
        let llm = ScriptedLlm::new(vec![text("unused")]);
        let mgr = manager(llm.clone(), 1);
        let out = mgr.delegate("t", "coder", None, mgr.root_budget().deeper()).await;
        assert_eq!(out, DEPTH_LIMIT_MESSAGE);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_nested_delegation_stops_at_depth() {
        // Every sub-agent tries to delegate again, then reports what the
        // nested call returned.
        let llm = ScriptedLlm::with_rules(
            vec![("ERROR: Maximum delegation depth", "deepest")],
            vec![
                calls(&[("d1", "delegate_task", r#"{"task":"a","trait":"coder"}"#)]),
                calls(&[("d2", "delegate_task", r#"{"task":"b","trait":"coder"}"#)]),
            ],
        );
        let mgr = manager(llm.clone(), 2);

        let out = mgr.delegate("top", "coder", None, mgr.root_budget()).await;
        assert!(out.starts_with("DELEGATION_RESULT from coder:\n"));
        // depth 1 -> depth 2 -> refused; nothing ran at depth 3
        assert!(llm
            .call(llm.call_count() - 1)
            .iter()
            .all(|m| !m.text().contains("(Delegation Depth: 3)")));
        assert_eq!(llm.calls_containing("ERROR: Maximum delegation depth"), 1);
    }

    #[tokio::test]
    async fn test_sub_agent_iteration_bound() {
        let responses = (0..8)
            .map(|_| calls(&[("c", "nothing_here", "{}")]))
            .collect();
        let llm = ScriptedLlm::new(responses);
        let mgr = manager(llm.clone(), 3);
        let out = mgr.run("spin", "coder", None, mgr.root_budget()).await.unwrap();
        assert_eq!(out, MAX_ITERATIONS_MESSAGE);
        assert_eq!(llm.call_count(), 5);
    }
}
