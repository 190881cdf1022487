//! Scheduled jobs. The core has no scheduler; an external timer (or
//! `gravclaw job <name>`) calls these entry points.
//!
//! Every job re-enters the agent loop or the memory store and leaves a
//! system message describing what it did.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use gravclaw_core::types::Role;
use gravclaw_core::utils::take_chars;
use gravclaw_memory::MemoryManager;

use crate::agent_loop::AgentLoop;
use crate::proactive::ProactiveMonitor;

const RECAP_PROMPT_CHARS: usize = 40_000;
const BRIEFING_HISTORY: usize = 5;
const RECOMMENDATION_HISTORY: usize = 10;
const RECAP_HISTORY: usize = 15;
const SUMMARIZE_BATCH: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobName {
    DailyBriefing,
    EveningRecap,
    SmartRecommendations,
    Heartbeat,
    ConsolidateMemory,
    FactConsolidation,
    SystemHealth,
    WorkspaceScan,
}

impl JobName {
    pub const ALL: [JobName; 8] = [
        JobName::DailyBriefing,
        JobName::EveningRecap,
        JobName::SmartRecommendations,
        JobName::Heartbeat,
        JobName::ConsolidateMemory,
        JobName::FactConsolidation,
        JobName::SystemHealth,
        JobName::WorkspaceScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::DailyBriefing => "daily-briefing",
            JobName::EveningRecap => "evening-recap",
            JobName::SmartRecommendations => "smart-recommendations",
            JobName::Heartbeat => "heartbeat",
            JobName::ConsolidateMemory => "consolidate-memory",
            JobName::FactConsolidation => "fact-consolidation",
            JobName::SystemHealth => "system-health",
            JobName::WorkspaceScan => "workspace-scan",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        JobName::ALL
            .into_iter()
            .find(|j| j.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = JobName::ALL.iter().map(|j| j.as_str()).collect();
                format!("unknown job '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// Cap a prompt at the recap limit, marking the cut.
fn cap_prompt(prompt: String) -> String {
    if prompt.chars().count() <= RECAP_PROMPT_CHARS {
        return prompt;
    }
    format!(
        "{}... [TRUNCATED DUE TO LENGTH]",
        take_chars(&prompt, RECAP_PROMPT_CHARS)
    )
}

pub struct ScheduledJobs {
    agent: Arc<AgentLoop>,
    memory: Arc<MemoryManager>,
    proactive: Arc<ProactiveMonitor>,
    task_list_path: PathBuf,
    watch_files: Vec<PathBuf>,
}

impl ScheduledJobs {
    pub fn new(
        agent: Arc<AgentLoop>,
        memory: Arc<MemoryManager>,
        proactive: Arc<ProactiveMonitor>,
        task_list_path: PathBuf,
        watch_files: Vec<PathBuf>,
    ) -> Self {
        Self {
            agent,
            memory,
            proactive,
            task_list_path,
            watch_files,
        }
    }

    /// Run one job by name and return what it produced.
    pub async fn run(&self, job: JobName) -> anyhow::Result<String> {
        info!(job = %job, "Running scheduled job");
        match job {
            JobName::DailyBriefing => self.run_daily_briefing().await,
            JobName::EveningRecap => self.run_evening_recap().await,
            JobName::SmartRecommendations => self.run_smart_recommendations().await,
            JobName::Heartbeat => self.run_heartbeat().await,
            JobName::ConsolidateMemory => self.consolidate_memory().await,
            JobName::FactConsolidation => self.run_fact_consolidation().await,
            JobName::SystemHealth => Ok(self.check_system_health().await),
            JobName::WorkspaceScan => Ok(self.scan_workspace().await),
        }
    }

    async fn note(&self, text: String) {
        if let Err(e) = self.memory.log_text(Role::System, &text).await {
            warn!(error = %e, "Failed to log job outcome");
        }
    }

    async fn task_list(&self) -> String {
        match tokio::fs::read_to_string(&self.task_list_path).await {
            Ok(content) => content,
            Err(_) => "No task list found.".to_string(),
        }
    }

    async fn history(&self, limit: usize) -> anyhow::Result<String> {
        let entries = self
            .memory
            .recent_context(limit)
            .await
            .context("reading recent history")?;
        Ok(entries
            .iter()
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub async fn run_daily_briefing(&self) -> anyhow::Result<String> {
        let history = self.history(BRIEFING_HISTORY).await?;
        let tasks = self.task_list().await;
        let prompt = format!(
            "You are Gravclaw's Chief of Staff. Prepare a high-density \"Morning Situational Report\" for the user.\n\n\
             HISTORY/FACTS:\n{history}\n\n\
             CURRENT TASK LIST:\n{tasks}\n\n\
             INSTRUCTIONS:\n\
             1. **Today's Priorities**: Identify the top 3 uncompleted tasks.\n\
             2. **Workspace Status**: Briefly summarize where we left off based on history.\n\
             3. **Personal Touch**: Acknowledge any reported user stressors or preferences from memory.\n\
             4. **Call to Action**: One specific question to kickstart the day.\n\n\
             STYLE: Professional, concise, proactive. Use Markdown formatting."
        );
        let response = self.agent.process_text(&prompt).await;
        self.note(format!(
            "DAILY BRIEFING GENERATED: {}...",
            take_chars(&response, 100)
        ))
        .await;
        Ok(response)
    }

    pub async fn run_evening_recap(&self) -> anyhow::Result<String> {
        let history = self.history(RECAP_HISTORY).await?;
        let prompt = cap_prompt(format!(
            "You are Gravclaw. It is evening. Prepare a \"Daily Recap\" for the user.\n\n\
             RECENT ACTIVITY:\n{history}\n\n\
             INSTRUCTIONS:\n\
             1. **Accomplishments**: List the key things we did today.\n\
             2. **Unfinished Business**: What was started but not finished?\n\
             3. **Tomorrow's Outlook**: Briefly mention what should be the first priority tomorrow.\n\n\
             Keep it warm but professional. Use Markdown."
        ));
        let response = self.agent.process_text(&prompt).await;
        self.note(format!(
            "EVENING RECAP GENERATED: {}...",
            take_chars(&response, 100)
        ))
        .await;
        Ok(response)
    }

    pub async fn run_smart_recommendations(&self) -> anyhow::Result<String> {
        let tasks = self.task_list().await;
        let history = self.history(RECOMMENDATION_HISTORY).await?;
        let prompt = format!(
            "You are Gravclaw, a high-agency proactive partner.\n\
             Review the user's current task list and recent conversation.\n\n\
             TASK LIST:\n{tasks}\n\n\
             RECENT CONTEXT:\n{history}\n\n\
             INSTRUCTIONS:\n\
             1. Identify ONE uncompleted task that seems high-priority or where the user might be stuck.\n\
             2. Propose a SPECIFIC action I (the AI) can take right now to help move it forward \
             (e.g., \"I can draft that email for you\", \"I can search for those leads\").\n\
             3. If the user hasn't talked for a while, keep it low-pressure. If they are active, be bold.\n\n\
             Response Style: Concise, punchy, helpful. Use Markdown. Start with \"**Smart Recommendation**\"."
        );
        let response = self.agent.process_text(&prompt).await;
        self.note(format!(
            "SMART RECOMMENDATION: {}...",
            take_chars(&response, 100)
        ))
        .await;
        Ok(response)
    }

    pub async fn run_heartbeat(&self) -> anyhow::Result<String> {
        let prompt = "It is morning. Perform a \"Workspace Heartbeat\":\n\
                      1. Review what changed recently based on our history and stored notes.\n\
                      2. Search your memory for any urgent reports or infrastructure notes.\n\
                      3. Prepare a concise 'Morning Briefing' for the user.\n\
                      4. If something looks urgent, mention it.\n\n\
                      Keep the summary professional and focused on the project.";
        let response = self.agent.process_text(prompt).await;
        self.note(format!("PROACTIVE HEARTBEAT: {response}")).await;
        Ok(response)
    }

    pub async fn consolidate_memory(&self) -> anyhow::Result<String> {
        let summary = self
            .memory
            .summarize_history(SUMMARIZE_BATCH)
            .await
            .context("summarizing history")?;
        let outcome = match summary {
            Some(id) => format!("Created summary #{id} from the oldest {SUMMARIZE_BATCH} messages."),
            None => "Nothing to summarize.".to_string(),
        };
        self.note(format!("MEMORY CONSOLIDATION: {outcome}")).await;
        Ok(outcome)
    }

    pub async fn run_fact_consolidation(&self) -> anyhow::Result<String> {
        let report = self
            .memory
            .consolidate_facts()
            .await
            .context("consolidating facts")?;
        let outcome = format!(
            "Merged {} fact groups, deleted {} facts.",
            report.merged, report.deleted
        );
        self.note(format!("FACT CONSOLIDATION: {outcome}")).await;
        Ok(outcome)
    }

    /// The health alert, or a healthy note.
    pub async fn check_system_health(&self) -> String {
        match self.proactive.check_system_health() {
            Some(alert) => {
                self.note(alert.clone()).await;
                alert
            }
            None => "System healthy.".to_string(),
        }
    }

    pub async fn scan_workspace(&self) -> String {
        let researched = self.proactive.scan_workspace(&self.watch_files).await;
        let outcome = format!("Researched {researched} workspace triggers.");
        if researched > 0 {
            self.note(format!("WORKSPACE SCAN: {outcome}")).await;
        }
        outcome
    }
}
