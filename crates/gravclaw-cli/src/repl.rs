//! Interactive chat. `rustyline` handles editing and keeps history under
//! the data directory between sessions.

use std::path::PathBuf;

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use gravclaw_agent::AgentLoop;

use crate::helpers;

const HISTORY_LIMIT: usize = 1000;

/// What one line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Quit,
    Message(&'a str),
}

fn classify(raw: &str) -> Line<'_> {
    let text = raw.trim();
    if text.is_empty() {
        return Line::Blank;
    }
    match text.to_lowercase().as_str() {
        "exit" | "quit" | "/exit" | "/quit" | ":q" => Line::Quit,
        _ => Line::Message(text),
    }
}

pub async fn run(agent: &AgentLoop) -> Result<()> {
    helpers::print_banner();

    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(HISTORY_LIMIT)?;
    let history = history_path();
    if editor.load_history(&history).is_ok() {
        debug!(path = %history.display(), "loaded REPL history");
    }

    loop {
        let raw = match editor.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        match classify(&raw) {
            Line::Blank => continue,
            Line::Quit => {
                println!("\nGoodbye!");
                break;
            }
            Line::Message(text) => {
                let _ = editor.add_history_entry(text);
                helpers::print_thinking();
                let reply = agent.process_text(text).await;
                helpers::clear_thinking();
                helpers::print_response(&reply);
            }
        }
    }

    if let Some(dir) = history.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    if let Err(e) = editor.save_history(&history) {
        debug!(error = %e, "failed to save REPL history");
    }
    Ok(())
}

fn history_path() -> PathBuf {
    gravclaw_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}
