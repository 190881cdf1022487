//! Proactive monitor: notices ideas in conversation or in watched files and
//! researches them quietly in the background, and watches process memory.
//!
//! Research results become strategic lessons; a trigger whose snippet is
//! already part of a stored lesson is not researched again.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use gravclaw_core::types::Message;
use gravclaw_core::utils::take_chars;
use gravclaw_memory::{FactKind, MemoryManager};
use gravclaw_providers::{LlmProvider, LlmRequestConfig};

use crate::status::resident_memory_mb;
use crate::subagent::SubagentManager;

const MIN_INTENT_CHARS: usize = 10;
const SNIPPET_CHARS: usize = 100;
const MARKERS: [&str; 2] = ["TODO:", "IDEA:"];
const INTENT_PREFIX: &str = "INTENT:";

fn intent_prompt(text: &str) -> String {
    format!(
        "Analyze this message from a user: \"{text}\"\n\
         Is the user expressing a new project idea, a curious thought, or a potential task they \
         haven't explicitly asked to start yet?\n\
         If YES and the idea is substantial, return \"INTENT: [one sentence summary of the idea]\".\n\
         If NO, return \"NONE\"."
    )
}

fn research_task(source: &str, snippet: &str) -> String {
    format!(
        "Analyze this TODO/IDEA found in {source}: \"{snippet}\".\n\
         Gather 3-5 high-signal findings or a brief implementation plan.\n\
         Do NOT notify the user yet."
    )
}

/// The part of `content` worth researching: 100 chars from the first
/// marker, or from the start when there is none.
pub fn trigger_snippet(content: &str) -> String {
    let start = MARKERS
        .iter()
        .filter_map(|m| content.find(m))
        .min()
        .unwrap_or(0);
    take_chars(&content[start..], SNIPPET_CHARS).trim().to_string()
}

pub struct ProactiveMonitor {
    memory: Arc<MemoryManager>,
    provider: Arc<dyn LlmProvider>,
    subagents: Arc<SubagentManager>,
    rss_alert_mb: f64,
}

impl ProactiveMonitor {
    pub fn new(
        memory: Arc<MemoryManager>,
        provider: Arc<dyn LlmProvider>,
        subagents: Arc<SubagentManager>,
        rss_alert_mb: f64,
    ) -> Self {
        Self {
            memory,
            provider,
            subagents,
            rss_alert_mb,
        }
    }

    /// Look for an unexpressed project idea in `text` and research it.
    /// Returns the detected intent.
    pub async fn detect_intent(&self, text: &str) -> Option<String> {
        if text.chars().count() < MIN_INTENT_CHARS {
            return None;
        }
        let reply = match self
            .provider
            .chat(&[Message::user(intent_prompt(text))], None, &LlmRequestConfig::default())
            .await
        {
            Ok(response) => response.content_or_empty(),
            Err(e) => {
                warn!(error = %e, "Intent detection failed");
                return None;
            }
        };

        let intent = reply.trim().strip_prefix(INTENT_PREFIX)?.trim().to_string();
        if intent.is_empty() {
            return None;
        }
        info!(intent = %intent, "Detected intent");
        self.research("Conversation Intent", &intent).await;
        Some(intent)
    }

    /// Research a trigger with a researcher sub-agent and keep the finding
    /// as a strategic lesson. Returns the finding, or `None` when skipped
    /// or failed.
    pub async fn research(&self, source: &str, content: &str) -> Option<String> {
        let snippet = trigger_snippet(content);
        if snippet.is_empty() {
            return None;
        }

        match self.memory.strategic_lessons().await {
            Ok(lessons) if lessons.iter().any(|l| l.contains(&snippet)) => {
                debug!(source, "Trigger already researched");
                return None;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read lessons, researching anyway"),
        }

        info!(source, snippet = %snippet, "Starting background research");
        let finding = match self
            .subagents
            .run(
                &research_task(source, &snippet),
                "researcher",
                None,
                self.subagents.root_budget(),
            )
            .await
        {
            Ok(finding) => finding,
            Err(e) => {
                warn!(source, error = %e, "Background research failed");
                return None;
            }
        };

        let lesson = format!("Proactive research on \"{snippet}\" ({source}): {finding}");
        if let Err(e) = self
            .memory
            .store_fact(
                &lesson,
                None,
                FactKind::StrategicLesson,
                Some(json!({ "source": source })),
            )
            .await
        {
            warn!(error = %e, "Could not store research result");
        }
        info!(source, "Background research completed");
        Some(finding)
    }

    /// Research `TODO:`/`IDEA:` markers in the given files. Missing files
    /// are skipped. Returns how many triggers were researched.
    pub async fn scan_workspace<P: AsRef<Path>>(&self, files: &[P]) -> usize {
        let mut researched = 0;
        for file in files {
            let path = file.as_ref();
            let content = match tokio::fs::read_to_string(path).await {
                Ok(c) => c,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping watched file");
                    continue;
                }
            };
            if !MARKERS.iter().any(|m| content.contains(m)) {
                continue;
            }
            if self
                .research(&path.display().to_string(), &content)
                .await
                .is_some()
            {
                researched += 1;
            }
        }
        researched
    }

    /// An alert when resident memory is above the configured limit.
    pub fn check_system_health(&self) -> Option<String> {
        let rss = resident_memory_mb()?;
        self.health_alert(rss)
    }

    fn health_alert(&self, rss_mb: f64) -> Option<String> {
        if rss_mb <= self.rss_alert_mb {
            return None;
        }
        warn!(rss_mb, limit_mb = self.rss_alert_mb, "Memory above alert threshold");
        Some(format!(
            "SYSTEM ALERT: Physical Memory (RSS) is at {rss_mb:.1} MB. I recommend optimization or a restart."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory, ScriptedLlm};
    use crate::tools::ToolRegistry;

    fn monitor(llm: Arc<ScriptedLlm>, mem: Arc<MemoryManager>, limit: f64) -> ProactiveMonitor {
        let subagents = Arc::new(SubagentManager::new(
            llm.clone(),
            mem.clone(),
            ToolRegistry::new(),
            LlmRequestConfig::default(),
            5,
            3,
        ));
        ProactiveMonitor::new(mem, llm, subagents, limit)
    }

    #[test]
    fn test_trigger_snippet() {
        assert_eq!(trigger_snippet("# Notes\nIDEA: solar kiln\nTODO: fix"), "IDEA: solar kiln\nTODO: fix");
        assert_eq!(trigger_snippet("build a bird house"), "build a bird house");
        let long = format!("x TODO: {}", "y".repeat(200));
        assert_eq!(trigger_snippet(&long).chars().count(), 100);
        assert!(trigger_snippet(&long).starts_with("TODO: y"));
    }

    #[tokio::test]
    async fn test_intent_triggers_research_once() {
        let llm = ScriptedLlm::with_rules(
            vec![
                ("Analyze this message", "INTENT: Build a solar-powered kiln"),
                ("TASK: Analyze this TODO/IDEA", "Use a Fresnel lens."),
            ],
            vec![],
        );
        let mem = memory();
        let proactive = monitor(llm.clone(), mem.clone(), 480.0);

        let intent = proactive
            .detect_intent("I've been wondering about building a solar kiln")
            .await;
        assert_eq!(intent.as_deref(), Some("Build a solar-powered kiln"));

        let lessons = mem.strategic_lessons().await.unwrap();
        assert_eq!(lessons.len(), 1);
        assert!(lessons[0].starts_with("Proactive research on \"Build a solar-powered kiln\""));
        assert!(lessons[0].ends_with("Use a Fresnel lens."));

        // Same idea again: detected, but not researched twice.
        proactive
            .detect_intent("Still thinking about that solar kiln idea")
            .await;
        assert_eq!(llm.calls_containing("TASK: Analyze this TODO/IDEA"), 1);
    }

    #[tokio::test]
    async fn test_no_intent() {
        let llm = ScriptedLlm::constant("NONE");
        let proactive = monitor(llm.clone(), memory(), 480.0);
        assert_eq!(proactive.detect_intent("what's the weather today?").await, None);
        assert_eq!(llm.call_count(), 1);

        assert_eq!(proactive.detect_intent("hi").await, None);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let task = dir.path().join("task.md");
        let readme = dir.path().join("README.md");
        std::fs::write(&task, "# Tasks\n- [x] done\nTODO: add retry to uploader").unwrap();
        std::fs::write(&readme, "# Project\nNothing to see.").unwrap();
        let missing = dir.path().join("missing.md");

        let llm = ScriptedLlm::with_rules(vec![("TASK: Analyze", "Wrap uploads in a backoff loop.")], vec![]);
        let mem = memory();
        let proactive = monitor(llm.clone(), mem.clone(), 480.0);

        assert_eq!(proactive.scan_workspace(&[&task, &readme, &missing]).await, 1);
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("task.md"));
        assert!(prompt.contains("\"TODO: add retry to uploader\""));

        // Second scan is deduplicated by the stored lesson.
        assert_eq!(proactive.scan_workspace(&[&task]).await, 0);
        assert_eq!(llm.call_count(), 1);
    }

    #[test]
    fn test_health_alert_threshold() {
        let proactive = monitor(ScriptedLlm::constant(""), memory(), 480.0);
        assert_eq!(proactive.health_alert(100.0), None);
        assert_eq!(proactive.health_alert(480.0), None);
        assert_eq!(
            proactive.health_alert(512.26).as_deref(),
            Some("SYSTEM ALERT: Physical Memory (RSS) is at 512.3 MB. I recommend optimization or a restart.")
        );
    }

    #[test]
    fn test_health_check_below_generous_limit() {
        let proactive = monitor(ScriptedLlm::constant(""), memory(), 1_000_000.0);
        assert_eq!(proactive.check_system_health(), None);
    }
}
