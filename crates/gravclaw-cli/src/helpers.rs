//! Shared CLI helpers: response printing and the REPL banner.

use colored::Colorize;

pub fn print_response(response: &str) {
    println!();
    println!("{}", "Gravclaw".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Gravclaw".cyan().bold(), version.dimmed());
    println!(
        "{}",
        "Type a message, /status for a health report, or \"exit\" to quit.".dimmed()
    );
    println!();
}

pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

/// Path shown for an indexed file: relative to `base` when it is inside it.
pub fn display_path(path: &std::path::Path, base: &std::path::Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
