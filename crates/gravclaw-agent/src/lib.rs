//! Gravclaw Agent: the orchestration core.
//!
//! This crate contains:
//! - **tools**: Tool trait, registry, concurrent executor, and the built-in tools
//! - **context**: System prompt and history assembly
//! - **agent_loop**: The bounded model ↔ tool loop behind every chat turn
//! - **subagent**: Role-specialised sub-agents with a delegation depth budget
//! - **workflow**: Plan, review, execute, block and resume multi-step work
//! - **reflector** / **proactive**: Background learning and research
//! - **jobs**: Entry points for the scheduled jobs
//! - **runtime**: Wires everything together from `Config`

pub mod tools;
pub mod executor;
pub mod roles;
pub mod context;
pub mod agent_loop;
pub mod subagent;
pub mod workflow;
pub mod reflector;
pub mod proactive;
pub mod status;
pub mod jobs;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use agent_loop::{AgentLoop, AgentSettings, LoopOutcome};
pub use context::ContextAssembler;
pub use jobs::{JobName, ScheduledJobs};
pub use proactive::ProactiveMonitor;
pub use reflector::Reflector;
pub use roles::RoleProfile;
pub use runtime::Runtime;
pub use status::StatusReport;
pub use subagent::{RecursionBudget, SubagentManager};
pub use tools::{Tool, ToolRegistry};
pub use workflow::{WorkflowEngine, WorkflowError, WorkflowRecord, WorkflowRun, WorkflowStatus};
