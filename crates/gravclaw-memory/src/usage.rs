//! Token accounting and cost estimates.

use serde::Serialize;

/// USD per million tokens (prompt, completion), matched by model-name substring.
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.5, 10.0),
    ("claude", 3.0, 15.0),
    ("gemini", 0.075, 0.3),
];

/// Estimated cost in USD, rounded to 6 decimals. Unknown models cost 0.
pub fn estimate_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let Some((_, input, output)) = PRICING.iter().find(|(needle, _, _)| model.contains(needle))
    else {
        return 0.0;
    };
    let raw = (prompt_tokens as f64 * input + completion_tokens as f64 * output) / 1_000_000.0;
    (raw * 1_000_000.0).round() / 1_000_000.0
}

/// Aggregated usage for a time window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_models() {
        assert!((estimate_cost("gpt-4o", 1_000_000, 0) - 2.5).abs() < 1e-9);
        assert!((estimate_cost("anthropic/claude-3.5-sonnet", 1000, 1000) - 0.018).abs() < 1e-9);
        assert!((estimate_cost("gemini-2.0-flash", 1_000_000, 1_000_000) - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        assert_eq!(estimate_cost("llama-3", 5000, 5000), 0.0);
    }

    #[test]
    fn test_rounding() {
        // 1 prompt token of gemini = 7.5e-8, rounds to 0
        assert_eq!(estimate_cost("gemini", 1, 0), 0.0);
        assert!((estimate_cost("gpt-4o", 2, 0) - 0.000005).abs() < 1e-12);
    }
}
