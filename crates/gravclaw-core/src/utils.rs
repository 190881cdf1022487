//! Utility helpers: path resolution, timestamps, text munging.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Get the Gravclaw data directory (e.g. `~/.gravclaw/`).
pub fn get_data_path() -> PathBuf {
    let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".gravclaw")
}

/// First `n` characters of `s`, without any marker.
pub fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Replace anything that is not alphanumeric with `_`.
pub fn safe_identifier(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(path.get(2..).unwrap_or(""))
    } else {
        PathBuf::from(path)
    }
}

/// Whitespace-separated word count.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").ok())
        .as_ref()
}

/// Strip a markdown code fence (```json ... ```) around a model reply.
///
/// Models wrap JSON in fences often enough that every structured prompt
/// goes through this before `serde_json::from_str`.
pub fn extract_json(raw: &str) -> &str {
    match fence_regex()
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
    {
        Some(m) => m.as_str(),
        None => raw.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_chars() {
        assert_eq!(take_chars("abcdef", 3), "abc");
        assert_eq!(take_chars("ab", 3), "ab");
    }

    #[test]
    fn test_safe_identifier() {
        assert_eq!(safe_identifier("docs/notes.md"), "docs_notes_md");
    }

    #[test]
    fn test_expand_home_tilde() {
        let expanded = expand_home("~/test/path");
        assert!(!expanded.starts_with("~"));
        assert!(expanded.to_str().unwrap().ends_with("test/path"));
    }

    #[test]
    fn test_expand_home_absolute() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\tthree\nfour "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_extract_json_fenced() {
        let raw = "```json\n[\"a\", \"b\"]\n```";
        assert_eq!(extract_json(raw), "[\"a\", \"b\"]");
    }

    #[test]
    fn test_extract_json_bare_fence() {
        assert_eq!(extract_json("```\n{\"x\":1}\n```"), "{\"x\":1}");
    }

    #[test]
    fn test_extract_json_unfenced() {
        assert_eq!(extract_json("  {\"x\":1} \n"), "{\"x\":1}");
    }

    #[test]
    fn test_data_path_ends_with_gravclaw() {
        assert!(get_data_path().ends_with(".gravclaw"));
    }
}
