//! LLM provider layer for Gravclaw.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`]: trait that every backend and the router implement
//! - [`registry`]: static specs for the supported backends, in failover order
//! - [`http_provider::HttpProvider`]: OpenAI-compatible client (OpenRouter, OpenAI)
//! - [`gemini::GeminiProvider`]: native Gemini client with model tiers
//! - [`router::FailoverRouter`]: tries the chain in order until one answers

pub mod error;
pub mod gemini;
pub mod http_provider;
pub mod registry;
pub mod router;
pub mod traits;

pub use error::{ProviderError, ProviderFailure};
pub use gemini::GeminiProvider;
pub use http_provider::HttpProvider;
pub use registry::{build_chain, find_by_name, ProviderKind, ProviderSpec, PROVIDERS};
pub use router::FailoverRouter;
pub use traits::{LlmProvider, LlmRequestConfig};
