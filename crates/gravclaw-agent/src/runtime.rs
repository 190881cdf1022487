//! Service wiring: builds every long-lived object once from `Config` and
//! hands them out as `Arc`s. There are no globals; the CLI owns a `Runtime`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use gravclaw_core::config::schema::Config;
use gravclaw_core::utils::expand_home;
use gravclaw_memory::MemoryManager;
use gravclaw_providers::{FailoverRouter, LlmProvider, ProviderError};

use crate::agent_loop::{AgentLoop, AgentSettings};
use crate::jobs::ScheduledJobs;
use crate::proactive::ProactiveMonitor;
use crate::reflector::Reflector;
use crate::subagent::SubagentManager;
use crate::tools::delegate::DelegateTool;
use crate::tools::time::CurrentTimeTool;
use crate::tools::workflow::{ResumeWorkflowTool, RunWorkflowTool};
use crate::tools::ToolRegistry;
use crate::workflow::WorkflowEngine;

pub struct Runtime {
    pub memory: Arc<MemoryManager>,
    pub agent: Arc<AgentLoop>,
    pub workflows: Arc<WorkflowEngine>,
    pub reflector: Arc<Reflector>,
    pub jobs: ScheduledJobs,
}

impl Runtime {
    /// Build the provider chain and open the memory store. A store that
    /// cannot be opened is an error; a missing provider key only leaves the
    /// chain empty so that status and memory commands still work.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let router = match FailoverRouter::from_config(&config.providers) {
            Ok(router) => router,
            Err(ProviderError::NotConfigured(hint)) => {
                warn!(hint = %hint, "No LLM provider configured; model calls will fail");
                FailoverRouter::new(Vec::new())
            }
            Err(e) => return Err(e).context("building provider chain"),
        };
        let names = router.provider_names();
        let provider: Arc<dyn LlmProvider> = Arc::new(router);

        let memory = MemoryManager::from_config(
            &config.memory,
            &config.providers.gemini.api_key,
            Arc::clone(&provider),
        )
        .with_context(|| format!("opening memory store at {}", config.memory.db_path))?;

        Ok(Self::assemble(config, provider, names, Arc::new(memory)))
    }

    /// Wire the services around an existing provider and memory store.
    pub fn assemble(
        config: &Config,
        provider: Arc<dyn LlmProvider>,
        provider_names: Vec<String>,
        memory: Arc<MemoryManager>,
    ) -> Self {
        let settings = AgentSettings::from_config(&config.agent, &config.memory);

        let mut base_tools = ToolRegistry::new();
        base_tools.register(Arc::new(CurrentTimeTool));

        let subagents = Arc::new(SubagentManager::new(
            Arc::clone(&provider),
            Arc::clone(&memory),
            base_tools.clone(),
            settings.request.clone(),
            settings.max_iterations,
            config.workflow.max_delegation_depth,
        ));
        let reflector = Arc::new(Reflector::new(Arc::clone(&memory), Arc::clone(&provider)));
        let workflows = Arc::new(WorkflowEngine::new(
            Arc::clone(&provider),
            Arc::clone(&memory),
            Arc::clone(&subagents),
            Arc::clone(&reflector),
            settings.request.clone(),
        ));
        let proactive = Arc::new(ProactiveMonitor::new(
            Arc::clone(&memory),
            Arc::clone(&provider),
            Arc::clone(&subagents),
            config.agent.rss_alert_mb,
        ));

        let mut tools = base_tools;
        tools.register(Arc::new(DelegateTool::new(
            Arc::clone(&subagents),
            subagents.root_budget(),
        )));
        tools.register(Arc::new(RunWorkflowTool::new(Arc::clone(&workflows))));
        tools.register(Arc::new(ResumeWorkflowTool::new(
            Arc::clone(&workflows),
            Arc::clone(&reflector),
        )));

        let agent = Arc::new(
            AgentLoop::new(provider, Arc::clone(&memory), tools, settings)
                .with_provider_names(provider_names)
                .with_proactive(Arc::clone(&proactive)),
        );

        let jobs = ScheduledJobs::new(
            Arc::clone(&agent),
            Arc::clone(&memory),
            proactive,
            expand_home(&config.agent.task_list_path),
            config
                .agent
                .watch_files
                .iter()
                .map(|f| expand_home(f))
                .collect::<Vec<PathBuf>>(),
        );

        info!(tools = agent.tools().len(), role = agent.role().id, "Runtime ready");
        Self {
            memory,
            agent,
            workflows,
            reflector,
            jobs,
        }
    }
}
