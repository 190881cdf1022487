//! The `/status` report: answered without the model and without logging.

use std::fmt;

use gravclaw_memory::{MemoryManager, UsageSummary};

/// Resident memory of this process in MB. Linux only.
pub fn resident_memory_mb() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
        let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb / 1024.0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
    pub version: &'static str,
    pub environment: String,
    pub memory_mb: Option<f64>,
    /// Message count, or why the store could not be read.
    pub database: Result<usize, String>,
    /// Provider chain in failover order.
    pub providers: Vec<String>,
    pub usage: Result<UsageSummary, String>,
}

impl StatusReport {
    pub async fn collect(memory: &MemoryManager, providers: &[String], environment: &str) -> Self {
        let database = if memory.db().ping().await {
            memory.message_count().await.map_err(|e| e.to_string())
        } else {
            Err("database did not answer".to_string())
        };
        Self {
            version: env!("CARGO_PKG_VERSION"),
            environment: environment.to_string(),
            memory_mb: resident_memory_mb(),
            database,
            providers: providers.to_vec(),
            usage: memory.today_usage().await.map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gravclaw Status")?;
        writeln!(f, "-------------------")?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Environment: {}", self.environment)?;
        match self.memory_mb {
            Some(mb) => writeln!(f, "Memory Usage: {mb:.0} MB")?,
            None => writeln!(f, "Memory Usage: unknown")?,
        }
        match &self.database {
            Ok(count) => writeln!(f, "Database: Connected ({count} messages found)")?,
            Err(e) => writeln!(f, "Database: Error: {e}")?,
        }
        if self.providers.is_empty() {
            writeln!(f, "Active LLM Fallback: None")?;
        } else {
            writeln!(f, "Active LLM Fallback: {}", self.providers.join(" -> "))?;
        }
        writeln!(f, "-------------------")?;
        writeln!(f, "Today's Usage (UTC):")?;
        match &self.usage {
            Ok(usage) => {
                writeln!(
                    f,
                    "- Tokens: {} prompt / {} comp",
                    usage.prompt_tokens, usage.completion_tokens
                )?;
                write!(f, "- Est. Cost: ${:.4}", usage.cost_usd)
            }
            Err(e) => write!(f, "- Unavailable: {e}"),
        }
    }
}
