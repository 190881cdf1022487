//! Provider error taxonomy.
//!
//! Every adapter failure falls through to the next backend in the router;
//! only `Exhausted` ever reaches the agent loop.

use thiserror::Error;

pub use gravclaw_core::types::ProviderFailure;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("no LLM provider configured: {0}")]
    NotConfigured(String),

    #[error("All LLM providers failed:\n{}", join_failures(.0))]
    Exhausted(Vec<ProviderFailure>),
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_display_lists_each_backend() {
        let err = ProviderError::Exhausted(vec![
            ProviderFailure {
                provider: "OpenRouter (Claude)".into(),
                message: "API error 429: rate limited".into(),
            },
            ProviderFailure {
                provider: "Gemini (Flash)".into(),
                message: "transport error: timed out".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "All LLM providers failed:\nOpenRouter (Claude): API error 429: rate limited\nGemini (Flash): transport error: timed out"
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = ProviderError::Api {
            status: 404,
            message: "model not found".into(),
        };
        assert_eq!(err.to_string(), "API error 404: model not found");
    }
}
