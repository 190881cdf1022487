//! `gravclaw onboard`: write the default config and create the data layout.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use gravclaw_core::config::{get_config_path, load_config, save_config};
use gravclaw_core::utils::{expand_home, get_data_path};

pub fn run() -> Result<()> {
    println!();
    println!("{}", "Gravclaw Setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    let config = load_config(None);
    if config_path.exists() {
        println!("  {} config already exists at {}", "✓".green(), config_path.display());
    } else {
        save_config(&config, Some(&config_path))
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("  {} created config at {}", "✓".green(), config_path.display());
    }

    let db_path = expand_home(&config.memory.db_path);
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        println!("  {} data dir at {}", "✓".green(), dir.display());
    }
    std::fs::create_dir_all(get_data_path().join("history"))?;

    create_template(&expand_home(&config.agent.task_list_path), TASK_TEMPLATE)?;

    println!();
    println!(
        "{}",
        "  Setup complete! Add an API key, then run `gravclaw agent`.".green()
    );
    println!();
    Ok(())
}

fn create_template(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("  {} {} already exists", "✓".green(), path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    println!("  {} created {}", "✓".green(), path.display());
    Ok(())
}

const TASK_TEMPLATE: &str = r#"# Tasks

Read by the daily briefing and the recommendation jobs.
Lines starting with TODO: or IDEA: are researched in the background.

- [ ] Tell Gravclaw what you are working on
"#;
