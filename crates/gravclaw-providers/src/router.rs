//! Failover router.
//!
//! Tries each backend strictly in registration order. Any error falls
//! through to the next one; nothing is retried on the same backend. When
//! the whole chain fails, one `Exhausted` error lists every backend's
//! failure in order.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use gravclaw_core::config::schema::ProvidersConfig;
use gravclaw_core::types::{LlmResponse, Message, ToolDefinition};

use crate::error::{ProviderError, ProviderFailure};
use crate::registry::build_chain;
use crate::traits::{LlmProvider, LlmRequestConfig};

pub struct FailoverRouter {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl FailoverRouter {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Build the router from config, skipping backends without a key.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        Ok(Self::new(build_chain(config)?))
    }

    /// Display names in failover order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.display_name().to_string())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for FailoverRouter {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            match provider.chat(messages, tools, config).await {
                Ok(mut resp) => {
                    if !failures.is_empty() {
                        info!(
                            provider = provider.display_name(),
                            skipped = failures.len(),
                            "Answered by fallback provider"
                        );
                    }
                    resp.provider
                        .get_or_insert_with(|| provider.display_name().to_string());
                    resp.model
                        .get_or_insert_with(|| provider.default_model().to_string());
                    resp.failovers = failures;
                    return Ok(resp);
                }
                Err(e) => {
                    warn!(provider = provider.display_name(), error = %e, "Provider failed, trying next");
                    failures.push(ProviderFailure {
                        provider: provider.display_name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(ProviderError::Exhausted(failures))
    }

    fn default_model(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.default_model())
            .unwrap_or("none")
    }

    fn display_name(&self) -> &str {
        "failover"
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted backend: fails or answers, and counts calls.
    struct StubProvider {
        name: &'static str,
        answer: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn ok(name: &'static str, answer: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer: Some(answer),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn chain(stubs: Vec<Arc<StubProvider>>) -> Vec<Arc<dyn LlmProvider>> {
        stubs
            .into_iter()
            .map(|p| p as Arc<dyn LlmProvider>)
            .collect()
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
            _config: &LlmRequestConfig,
        ) -> Result<LlmResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(text) => Ok(LlmResponse::text(text)),
                None => Err(ProviderError::Api {
                    status: 429,
                    message: format!("{} quota", self.name),
                }),
            }
        }

        fn default_model(&self) -> &str {
            "stub-model"
        }

        fn display_name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let a = StubProvider::ok("a", "from a");
        let b = StubProvider::ok("b", "from b");
        let router = FailoverRouter::new(chain(vec![a.clone(), b.clone()]));

        let resp = router
            .chat(&[Message::user("hi")], None, &LlmRequestConfig::default())
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("from a"));
        assert_eq!(resp.provider.as_deref(), Some("a"));
        assert_eq!(resp.model.as_deref(), Some("stub-model"));
        assert!(resp.failovers.is_empty());
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_k_failures() {
        let a = StubProvider::failing("a");
        let b = StubProvider::failing("b");
        let c = StubProvider::ok("c", "from c");
        let d = StubProvider::ok("d", "from d");
        let router = FailoverRouter::new(chain(vec![a.clone(), b.clone(), c.clone(), d.clone()]));

        let resp = router
            .chat(&[Message::user("hi")], None, &LlmRequestConfig::default())
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("from c"));
        assert_eq!(resp.provider.as_deref(), Some("c"));
        // no retries on the same backend
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(d.calls.load(Ordering::SeqCst), 0);

        let skipped: Vec<_> = resp.failovers.iter().map(|f| f.provider.as_str()).collect();
        assert_eq!(skipped, vec!["a", "b"]);
        assert_eq!(resp.failovers[0].message, "API error 429: a quota");
    }

    #[tokio::test]
    async fn test_exhausted_lists_failures_in_order() {
        let router = FailoverRouter::new(chain(vec![
            StubProvider::failing("first"),
            StubProvider::failing("second"),
            StubProvider::failing("third"),
        ]));

        let err = router
            .chat(&[Message::user("hi")], None, &LlmRequestConfig::default())
            .await
            .unwrap_err();

        match &err {
            ProviderError::Exhausted(failures) => {
                let names: Vec<_> = failures.iter().map(|f| f.provider.as_str()).collect();
                assert_eq!(names, vec!["first", "second", "third"]);
                assert_eq!(failures[1].message, "API error 429: second quota");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert!(err.to_string().starts_with("All LLM providers failed:\nfirst: "));
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let router = FailoverRouter::new(vec![]);
        let err = router
            .chat(&[Message::user("hi")], None, &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted(ref f) if f.is_empty()));
        assert_eq!(router.default_model(), "none");
    }

    #[tokio::test]
    async fn test_http_failover_between_real_adapters() {
        let primary = MockServer::start().await;
        let fallback = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(402).set_body_string("insufficient credits"))
            .mount(&primary)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "fallback answer"}, "finish_reason": "stop"}]
            })))
            .mount(&fallback)
            .await;

        let mut config = ProvidersConfig::default();
        config.openrouter.api_key = "sk-or".into();
        config.openrouter.api_base = Some(primary.uri());
        config.openai.api_key = "sk-oa".into();
        config.openai.api_base = Some(fallback.uri());
        config.timeout_secs = 5;

        let router = FailoverRouter::from_config(&config).unwrap();
        assert_eq!(
            router.provider_names(),
            vec!["OpenRouter (Claude)", "OpenAI (GPT-4o)"]
        );

        let resp = router
            .chat(&[Message::user("hi")], None, &LlmRequestConfig::default())
            .await
            .unwrap();
        assert_eq!(resp.content.as_deref(), Some("fallback answer"));
        assert_eq!(resp.provider.as_deref(), Some("OpenAI (GPT-4o)"));
    }
}
