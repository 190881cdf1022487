//! Gravclaw CLI: entry point.
//!
//! # Commands
//!
//! - `gravclaw agent [-m MESSAGE]`: chat (single-shot or REPL)
//! - `gravclaw onboard`: write the default config and data layout
//! - `gravclaw status`: health report, answered without the model
//! - `gravclaw job <name>`: run one scheduled job now
//! - `gravclaw workflow run|resume|list`: drive multi-step workflows
//! - `gravclaw index <path>...`: add files to long-term memory

mod helpers;
mod onboard;
mod repl;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use gravclaw_agent::tools::workflow::{render_resumed, render_started};
use gravclaw_agent::{JobName, Runtime};
use gravclaw_core::config::load_config;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Gravclaw: a personal AI assistant with tiered memory and workflows
#[derive(Parser)]
#[command(name = "gravclaw", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (single-shot or interactive REPL)
    Agent {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Write the default config and create the data directory
    Onboard,

    /// Show version, memory, storage, providers and today's usage
    Status,

    /// Run one scheduled job now
    Job {
        /// daily-briefing, evening-recap, smart-recommendations, heartbeat,
        /// consolidate-memory, fact-consolidation, system-health, workspace-scan
        name: JobName,
    },

    /// Plan, resume or list workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommands,
    },

    /// Index files into long-term memory
    Index {
        /// Files or directories (walked recursively, dot-entries skipped)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Plan a request and run it until it completes or needs input
    Run {
        /// The high-level request to decompose
        request: String,
    },
    /// Answer a blocked workflow's question and continue it
    Resume {
        id: i64,
        /// The information the workflow asked for
        input: String,
    },
    /// Show the most recent workflows
    List {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(None);
    init_logging(cli.logs || config.agent.debug);

    if let Commands::Onboard = cli.command {
        return onboard::run();
    }

    let runtime = Runtime::from_config(&config).context("starting Gravclaw")?;

    match cli.command {
        Commands::Agent { message } => run_agent(&runtime, message).await,
        Commands::Status => {
            println!("{}", runtime.agent.status().await);
            Ok(())
        }
        Commands::Job { name } => {
            let output = runtime
                .jobs
                .run(name)
                .await
                .with_context(|| format!("job {name} failed"))?;
            helpers::print_response(&output);
            Ok(())
        }
        Commands::Workflow { action } => run_workflow(&runtime, action).await,
        Commands::Index { paths } => run_index(&runtime, &paths).await,
        Commands::Onboard => Ok(()),
    }
}

async fn run_agent(runtime: &Runtime, message: Option<String>) -> Result<()> {
    match message {
        Some(msg) => {
            info!("processing single message");
            let response = runtime.agent.process_text(&msg).await;
            helpers::print_response(&response);
            Ok(())
        }
        None => repl::run(&runtime.agent).await,
    }
}

async fn run_workflow(runtime: &Runtime, action: WorkflowCommands) -> Result<()> {
    match action {
        WorkflowCommands::Run { request } => {
            let run = runtime
                .workflows
                .start(&request)
                .await
                .context("workflow failed")?;
            helpers::print_response(&render_started(&run));
        }
        WorkflowCommands::Resume { id, input } => {
            let run = runtime
                .workflows
                .resume(id, &input)
                .await
                .with_context(|| format!("resuming workflow {id}"))?;
            if let Err(e) = runtime.reflector.learn_preference(&input).await {
                warn!(error = %e, "Preference learning failed");
            }
            helpers::print_response(&render_resumed(&run));
        }
        WorkflowCommands::List { limit } => {
            let records = runtime.workflows.list(limit).await?;
            if records.is_empty() {
                println!("{}", "No workflows yet.".dimmed());
            }
            for wf in records {
                println!(
                    "  {:>4}  {:<10} step {}/{}  {}",
                    format!("#{}", wf.id).bold(),
                    wf.status.to_string(),
                    wf.current_step.min(wf.plan.len()),
                    wf.plan.len(),
                    wf.name
                );
            }
        }
    }
    Ok(())
}

async fn run_index(runtime: &Runtime, paths: &[PathBuf]) -> Result<()> {
    let base = std::env::current_dir().context("reading current directory")?;
    let mut files = Vec::new();
    for path in paths {
        collect_files(path, &mut files)
            .with_context(|| format!("reading {}", path.display()))?;
    }

    let mut total = 0;
    for file in &files {
        let content = match std::fs::read_to_string(file) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };
        let shown = helpers::display_path(file, &base);
        let chunks = runtime
            .memory
            .index_file(&shown, &content)
            .await
            .with_context(|| format!("indexing {shown}"))?;
        println!("  {} {shown} ({chunks} chunks)", "✓".green());
        total += chunks;
    }

    println!("  Indexed {} files, {total} chunks.", files.len());
    Ok(())
}

fn collect_files(path: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !path.is_dir() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    let mut entries: Vec<_> = std::fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| !n.to_string_lossy().starts_with('.'))
        })
        .collect();
    entries.sort();
    for entry in entries {
        collect_files(&entry, out)?;
    }
    Ok(())
}

/// Initialize tracing. `GRAVCLAW_LOG_FORMAT=json` switches to JSON lines.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("gravclaw=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let json = std::env::var("GRAVCLAW_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_job_names() {
        let cli = Cli::try_parse_from(["gravclaw", "job", "evening_recap"]).unwrap();
        assert!(matches!(cli.command, Commands::Job { name: JobName::EveningRecap }));
        assert!(Cli::try_parse_from(["gravclaw", "job", "nap"]).is_err());
    }

    #[test]
    fn parses_workflow_resume() {
        let cli = Cli::try_parse_from(["gravclaw", "workflow", "resume", "4", "Lisbon"]).unwrap();
        match cli.command {
            Commands::Workflow {
                action: WorkflowCommands::Resume { id, input },
            } => {
                assert_eq!(id, 4);
                assert_eq!(input, "Lisbon");
            }
            _ => panic!("expected workflow resume"),
        }
    }

    #[test]
    fn logs_flag_is_global() {
        let cli = Cli::try_parse_from(["gravclaw", "status", "--logs"]).unwrap();
        assert!(cli.logs);
    }

    #[test]
    fn collect_files_skips_dot_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "x").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/guide.md"), "guide").unwrap();
        std::fs::write(dir.path().join("README.md"), "readme").unwrap();

        let mut files = Vec::new();
        collect_files(dir.path(), &mut files).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| helpers::display_path(f, dir.path()))
            .collect();
        assert_eq!(names, vec!["README.md", "docs/guide.md"]);
    }
}
