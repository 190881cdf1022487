//! Context assembly: recent history, the rolling summary and recalled facts,
//! rendered into the system prompt of one turn.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, warn};

use gravclaw_core::types::{Message, ToolCall};
use gravclaw_memory::{HistoryEntry, MemoryManager};

const INSTRUCTIONS: &str = "INSTRUCTIONS:\n\
- You have access to tools. Use them proactively to solve the user's problems.\n\
- Be concise, bold, and helpful.";

/// What memory contributed to one turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentContext {
    /// Summary entry (if any) followed by recent messages, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Tagged recall lines (`[FACT] ...`, `[CHAT] user: ...`).
    pub facts: Vec<String>,
}

impl AgentContext {
    pub fn render(&self) -> String {
        let history = self
            .history
            .iter()
            .map(|h| format!("{}: {}", h.role, h.content))
            .collect::<Vec<_>>()
            .join("\n");
        let facts = if self.facts.is_empty() {
            String::new()
        } else {
            let lines = self
                .facts
                .iter()
                .map(|f| format!("- {f}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("\nRelevant Memories:\n{lines}")
        };
        format!("HISTORY:\n{history}\n{facts}")
    }
}

/// Queries the memory store for a new message.
pub struct ContextAssembler {
    memory: Arc<MemoryManager>,
    history_limit: usize,
}

impl ContextAssembler {
    pub fn new(memory: Arc<MemoryManager>, history_limit: usize) -> Self {
        Self {
            memory,
            history_limit,
        }
    }

    /// Gather context for `query`. A failing tier is logged and left empty
    /// so the turn can still run.
    pub async fn assemble(&self, query: &str) -> AgentContext {
        let facts = self.memory.search_relevant_facts(query).await;
        let history = match self.memory.recent_context(self.history_limit).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "Recent history unavailable");
                Vec::new()
            }
        };
        debug!(facts = facts.len(), history = history.len(), "Context assembled");
        AgentContext { history, facts }
    }
}

/// Role prompt, current time, rendered context and the fixed instructions.
pub fn build_system_prompt(role_prompt: &str, context: &AgentContext) -> String {
    let now = Local::now().format("%A, %B %-d, %Y %H:%M:%S");
    format!(
        "{role_prompt}\nTime: {now}\n\n{}\n\n{INSTRUCTIONS}",
        context.render()
    )
}

/// Append the model's turn. Text-only replies without content add nothing.
pub fn add_assistant_message(messages: &mut Vec<Message>, content: Option<String>, tool_calls: Vec<ToolCall>) {
    if tool_calls.is_empty() {
        if let Some(text) = content {
            messages.push(Message::assistant(text));
        }
    } else {
        messages.push(Message::assistant_tool_calls(content, tool_calls));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gravclaw_core::types::Role;
    use gravclaw_memory::FactKind;

    use crate::test_support::memory;

    #[test]
    fn test_render_empty() {
        assert_eq!(AgentContext::default().render(), "HISTORY:\n\n");
    }

    #[test]
    fn test_render_history_and_facts() {
        let ctx = AgentContext {
            history: vec![
                HistoryEntry {
                    role: Role::System,
                    content: "[HISTORICAL CONTEXT SUMMARY]: talked about Bali".into(),
                },
                HistoryEntry {
                    role: Role::User,
                    content: "book the flight".into(),
                },
            ],
            facts: vec!["[PREFERENCE] window seat".into()],
        };
        assert_eq!(
            ctx.render(),
            "HISTORY:\nsystem: [HISTORICAL CONTEXT SUMMARY]: talked about Bali\nuser: book the flight\n\
             \nRelevant Memories:\n- [PREFERENCE] window seat"
        );
    }

    #[test]
    fn test_system_prompt_layout() {
        let prompt = build_system_prompt("You are a test.", &AgentContext::default());
        assert!(prompt.starts_with("You are a test.\nTime: "));
        assert!(prompt.contains("\n\nHISTORY:\n"));
        assert!(prompt.ends_with("- Be concise, bold, and helpful."));
    }

    #[tokio::test]
    async fn test_assemble_reads_all_tiers() {
        let mem = memory();
        mem.log_text(Role::User, "hello").await.unwrap();
        mem.log_text(Role::Assistant, "hi there").await.unwrap();
        mem.store_fact("Prefers short answers", None, FactKind::UserPreference, None)
            .await
            .unwrap();

        let ctx = ContextAssembler::new(mem, 5).assemble("anything").await;
        let roles: Vec<_> = ctx.history.iter().map(|h| h.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(ctx.facts, vec!["[PREFERENCE] Prefers short answers"]);
    }

    #[tokio::test]
    async fn test_assemble_respects_history_limit() {
        let mem = memory();
        for i in 0..4 {
            mem.log_text(Role::User, &format!("m{i}")).await.unwrap();
        }
        let ctx = ContextAssembler::new(mem, 2).assemble("q").await;
        let contents: Vec<_> = ctx.history.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }

    #[test]
    fn test_add_assistant_message_variants() {
        let mut msgs = Vec::new();
        add_assistant_message(&mut msgs, None, vec![]);
        assert!(msgs.is_empty());

        add_assistant_message(&mut msgs, Some("hello".into()), vec![]);
        assert_eq!(msgs, vec![Message::assistant("hello")]);

        let tc = ToolCall::new("id1", "get_current_time", "{}");
        add_assistant_message(&mut msgs, None, vec![tc.clone()]);
        assert_eq!(msgs[1], Message::assistant_tool_calls(None, vec![tc]));
    }
}
