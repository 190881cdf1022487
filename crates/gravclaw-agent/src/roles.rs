//! Role catalogue for the top-level agent and sub-agents.

/// Appended to every role so sub-agents build on the shared blackboard.
const SWARM_COLLABORATION: &str = "\nYou are part of an Agent Swarm. If a 'COLLABORATIVE BLACKBOARD' is provided, you MUST use the findings there to inform your work. Do not repeat research already done by previous agents. Build upon their results.";

/// Appended to every role; the workflow engine pauses on this marker.
const INPUT_REQUISITION: &str = "\nIf you need missing information or approval from the user to proceed, start your response with 'REQUEST_USER_INPUT: [Your specific question here]'. This will pause the current workflow and notify the user.";

/// Prefix a sub-agent uses to ask the user for input.
pub const REQUEST_USER_INPUT: &str = "REQUEST_USER_INPUT:";

pub const DEFAULT_ROLE: &str = "generalist";

#[derive(Debug, PartialEq, Eq)]
pub struct RoleProfile {
    pub id: &'static str,
    pub name: &'static str,
    /// One-liner used in the planner's role catalogue.
    pub summary: &'static str,
    base_prompt: &'static str,
}

impl RoleProfile {
    pub fn system_prompt(&self) -> String {
        format!("{}{SWARM_COLLABORATION}{INPUT_REQUISITION}", self.base_prompt)
    }
}

pub static ROLES: &[RoleProfile] = &[
    RoleProfile {
        id: "researcher",
        name: "Deep Researcher",
        summary: "Deep web research and fact-finding.",
        base_prompt: "You are the Research Specialist for Gravclaw. Your goal is to find high-signal information, verify facts, and synthesize complex topics into brief reports.",
    },
    RoleProfile {
        id: "coder",
        name: "Software Engineer",
        summary: "Writing, debugging, and refactoring code.",
        base_prompt: "You are an expert Senior Software Engineer. You write clean, performant, and secure code. You follow best practices and think step-by-step before implementing solutions.",
    },
    RoleProfile {
        id: "seo",
        name: "SEO Specialist",
        summary: "Domain audits, keyword research, and link building.",
        base_prompt: "You are an SEO Veteran. You understand domain authority, backlink profiles, and on-page optimization. Your goal is to help the user and their clients grow their digital presence.",
    },
    RoleProfile {
        id: "generalist",
        name: "General Assistant",
        summary: "Default assistant for summaries and formatting.",
        base_prompt: "You are Gravclaw, a high-agency personal AI partner. You are helpful, concise, and proactive.",
    },
];

/// Look up a role by id, falling back to the generalist.
pub fn role(id: &str) -> &'static RoleProfile {
    ROLES
        .iter()
        .find(|r| r.id.eq_ignore_ascii_case(id.trim()))
        .unwrap_or(&ROLES[ROLES.len() - 1])
}

pub fn role_ids() -> Vec<&'static str> {
    ROLES.iter().map(|r| r.id).collect()
}

/// `- id: summary` lines for the planning prompt.
pub fn catalogue() -> String {
    ROLES
        .iter()
        .map(|r| format!("- {}: {}", r.id, r.summary))
        .collect::<Vec<_>>()
        .join("\n")
}
