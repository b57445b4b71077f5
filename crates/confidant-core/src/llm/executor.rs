//! Provider fallback executor.
//!
//! Tries an ordered list of language-model backends until one succeeds.
//! The order is: the preferred provider (if any), then the configured
//! fallback order (deduplicated), then the configured default provider if the
//! list is still empty. Providers that are disabled, unknown, or failing their
//! availability probe are skipped; every other failure, timeouts included,
//! moves on to the next candidate.

use std::sync::Mutex;
use std::time::Duration;

use confidant_types::config::FallbackConfig;
use confidant_types::llm::{
    CompletionOptions, CompletionRequest, CompletionResult, LlmError, Message, ProviderConfig,
    ProviderStatusInfo,
};

use super::box_provider::BoxLlmProvider;
use super::completer::Completer;
use super::health::ProviderHealth;

/// A registered backend with its configuration and circuit breaker.
struct ProviderSlot {
    config: ProviderConfig,
    provider: BoxLlmProvider,
    health: Mutex<ProviderHealth>,
}

impl ProviderSlot {
    fn with_health<R>(&self, f: impl FnOnce(&mut ProviderHealth) -> R) -> R {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut health)
    }
}

/// Routes generation requests through the configured providers with failover.
///
/// Shared behind an `Arc`; circuit-breaker state sits behind a short-lived
/// per-provider mutex that is never held across an await.
pub struct ProviderExecutor {
    slots: Vec<ProviderSlot>,
    fallback: FallbackConfig,
}

impl ProviderExecutor {
    pub fn new(fallback: FallbackConfig) -> Self {
        Self {
            slots: Vec::new(),
            fallback,
        }
    }

    /// Register a backend under `config.name`.
    pub fn register(&mut self, config: ProviderConfig, provider: BoxLlmProvider) {
        self.slots.push(ProviderSlot {
            config,
            provider,
            health: Mutex::new(ProviderHealth::default()),
        });
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.config.name.as_str()).collect()
    }

    fn slot(&self, name: &str) -> Option<&ProviderSlot> {
        self.slots.iter().find(|s| s.config.name == name)
    }

    /// Candidate order for one request.
    pub fn provider_order(&self, preferred: Option<&str>) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        let candidates = preferred
            .into_iter()
            .chain(self.fallback.order.iter().map(String::as_str));
        for name in candidates {
            if !order.iter().any(|existing| existing == name) {
                order.push(name.to_string());
            }
        }
        if order.is_empty() && !self.fallback.default_provider.is_empty() {
            order.push(self.fallback.default_provider.clone());
        }
        order
    }

    /// Issue one generation, failing over across providers.
    #[tracing::instrument(
        name = "provider_execute",
        skip(self, messages, options),
        fields(preferred = preferred.unwrap_or("-"), messages = messages.len())
    )]
    pub async fn execute(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        preferred: Option<&str>,
    ) -> Result<CompletionResult, LlmError> {
        let order = self.provider_order(preferred);
        let total = order.len();
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<(String, LlmError)> = None;
        let mut failures: u32 = 0;

        for (position, name) in order.iter().enumerate() {
            let is_last = position + 1 == total;

            let Some(slot) = self.slot(name) else {
                tracing::debug!(provider = %name, "Provider not configured, skipping");
                continue;
            };
            if !slot.config.enabled {
                tracing::debug!(provider = %name, "Provider disabled, skipping");
                continue;
            }
            if !slot.with_health(|h| h.is_available()) {
                tracing::debug!(provider = %name, "Provider circuit open, skipping");
                continue;
            }
            if !slot.provider.probe().await {
                tracing::debug!(provider = %name, "Provider failed availability probe, skipping");
                continue;
            }

            let model = match (&options.model, preferred) {
                (Some(model), Some(p)) if p == name => model.clone(),
                _ => slot.config.model.clone(),
            };
            let request = CompletionRequest {
                model,
                messages: messages.to_vec(),
                max_tokens: options
                    .max_tokens
                    .unwrap_or(slot.config.max_output_tokens),
                temperature: options.temperature,
                conversation_id: options.conversation_id.clone(),
            };

            attempted.push(name.clone());
            let timeout_secs = slot.config.timeout_secs;
            let outcome = tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                slot.provider.complete(&request),
            )
            .await
            .unwrap_or_else(|_| Err(LlmError::Timeout { timeout_secs }));

            match outcome {
                Ok(response) => {
                    slot.with_health(|h| h.record_success());
                    tracing::info!(
                        provider = %name,
                        model = %response.model,
                        prompt_tokens = response.usage.prompt_tokens,
                        completion_tokens = response.usage.completion_tokens,
                        cached_tokens = response.usage.cached_tokens.unwrap_or(0),
                        fallback_count = failures,
                        "Generation succeeded"
                    );
                    return Ok(CompletionResult {
                        content: response.content,
                        provider: name.clone(),
                        model: response.model,
                        usage: response.usage,
                        fallback_count: failures,
                    });
                }
                Err(err) => {
                    slot.with_health(|h| h.record_failure(&err));
                    failures += 1;

                    if !self.fallback.enabled || is_last {
                        tracing::error!(
                            provider = %name,
                            error = %err,
                            fallback_enabled = self.fallback.enabled,
                            "Provider failed, no candidates left"
                        );
                        return Err(LlmError::AllProvidersExhausted {
                            last_provider: name.clone(),
                            message: err.to_string(),
                            attempted,
                        });
                    }

                    tracing::warn!(
                        provider = %name,
                        error = %err,
                        "Provider failed, trying next in order"
                    );
                    last_error = Some((name.clone(), err));
                }
            }
        }

        Err(match last_error {
            Some((last_provider, err)) => LlmError::AllProvidersExhausted {
                last_provider,
                message: err.to_string(),
                attempted,
            },
            None => LlmError::AllProvidersExhausted {
                last_provider: order.last().cloned().unwrap_or_default(),
                message: "no configured provider was available".to_string(),
                attempted,
            },
        })
    }

    /// Per-provider health snapshot (for the `provider status` command).
    pub fn status(&self) -> Vec<ProviderStatusInfo> {
        self.slots
            .iter()
            .map(|slot| {
                slot.with_health(|h| ProviderStatusInfo {
                    name: slot.config.name.clone(),
                    model: slot.config.model.clone(),
                    enabled: slot.config.enabled,
                    circuit_state: h.state.label().to_string(),
                    last_error: h.last_error.clone(),
                    total_calls: h.total_calls,
                    total_failures: h.total_failures,
                })
            })
            .collect()
    }
}

impl Completer for ProviderExecutor {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<CompletionResult, LlmError> {
        self.execute(messages, options, None).await
    }

    async fn complete_preferring(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        preferred: Option<&str>,
    ) -> Result<CompletionResult, LlmError> {
        self.execute(messages, options, preferred).await
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use confidant_types::llm::{CompletionResponse, MessageRole, Usage};

    use super::*;
    use crate::llm::provider::LlmProvider;

    #[derive(Clone)]
    enum Behavior {
        Reply(String),
        Fail,
        Hang,
    }

    #[derive(Clone)]
    struct MockProvider {
        name: String,
        behavior: Behavior,
        available: bool,
        calls: Arc<AtomicUsize>,
        seen_model: Arc<Mutex<Option<String>>>,
    }

    impl MockProvider {
        fn new(name: &str, behavior: Behavior) -> Self {
            Self {
                name: name.to_string(),
                behavior,
                available: true,
                calls: Arc::new(AtomicUsize::new(0)),
                seen_model: Arc::new(Mutex::new(None)),
            }
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }
    }

    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn complete(
            &self,
            request: &CompletionRequest,
        ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_model.lock().unwrap() = Some(request.model.clone());
            let behavior = self.behavior.clone();
            let model = request.model.clone();
            async move {
                match behavior {
                    Behavior::Reply(content) => Ok(CompletionResponse {
                        id: "resp-1".to_string(),
                        content,
                        role: MessageRole::Assistant,
                        model,
                        usage: Usage::new(12, 3, Some(6)),
                        metadata: Default::default(),
                    }),
                    Behavior::Fail => Err(LlmError::Provider {
                        message: "500 Internal Server Error".to_string(),
                    }),
                    Behavior::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Err(LlmError::Provider {
                            message: "unreachable".to_string(),
                        })
                    }
                }
            }
        }

        fn probe(&self) -> impl Future<Output = bool> + Send {
            let available = self.available;
            async move { available }
        }
    }

    fn provider_config(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind: confidant_types::llm::ProviderKind::OpenAiCompatible,
            base_url: None,
            model: format!("{name}-model"),
            api_key_env: None,
            enabled: true,
            timeout_secs: 5,
            max_output_tokens: 256,
        }
    }

    fn fallback(order: &[&str]) -> FallbackConfig {
        FallbackConfig {
            enabled: true,
            order: order.iter().map(|s| s.to_string()).collect(),
            default_provider: "openai".to_string(),
        }
    }

    fn executor(order: &[&str], providers: Vec<MockProvider>) -> ProviderExecutor {
        let mut executor = ProviderExecutor::new(fallback(order));
        for provider in providers {
            executor.register(provider_config(&provider.name), BoxLlmProvider::new(provider));
        }
        executor
    }

    fn messages() -> Vec<Message> {
        vec![Message::system("persona"), Message::user("hi")]
    }

    #[test]
    fn test_order_preferred_first_then_deduplicated_fallback() {
        let exec = executor(&["grok", "openai", "grok"], vec![]);
        assert_eq!(exec.provider_order(Some("openai")), vec!["openai", "grok"]);
        assert_eq!(exec.provider_order(None), vec!["grok", "openai"]);
    }

    #[test]
    fn test_order_falls_back_to_default_when_empty() {
        let exec = executor(&[], vec![]);
        assert_eq!(exec.provider_order(None), vec!["openai"]);
        assert_eq!(exec.provider_order(Some("grok")), vec!["grok"]);
    }

    #[tokio::test]
    async fn test_primary_succeeds() {
        let grok = MockProvider::new("grok", Behavior::Reply("Hi there".to_string()));
        let openai = MockProvider::new("openai", Behavior::Reply("Hello".to_string()));
        let openai_calls = openai.calls.clone();
        let exec = executor(&["grok", "openai"], vec![grok, openai]);

        let result = exec
            .execute(&messages(), &CompletionOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(result.content, "Hi there");
        assert_eq!(result.provider, "grok");
        assert_eq!(result.model, "grok-model");
        assert_eq!(result.fallback_count, 0);
        assert_eq!(result.usage.cached_tokens, Some(6));
        assert!((result.usage.cache_hit_ratio.unwrap() - 0.5).abs() < f32::EPSILON);
        assert_eq!(openai_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_over_to_next_provider() {
        let grok = MockProvider::new("grok", Behavior::Hang);
        let openai = MockProvider::new("openai", Behavior::Reply("Hello".to_string()));
        let exec = executor(&["grok", "openai"], vec![grok, openai]);

        let result = exec
            .execute(&messages(), &CompletionOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(result.content, "Hello");
        assert_eq!(result.provider, "openai");
        assert_eq!(result.fallback_count, 1);

        let status = exec.status();
        assert_eq!(status[0].total_failures, 1);
        assert!(status[0].last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_third_provider_wins_after_two_failures() {
        let a = MockProvider::new("a", Behavior::Fail);
        let b = MockProvider::new("b", Behavior::Fail);
        let c = MockProvider::new("c", Behavior::Reply("from c".to_string()));
        let exec = executor(&["a", "b", "c"], vec![a, b, c]);

        let result = exec
            .execute(&messages(), &CompletionOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(result.provider, "c");
        assert_eq!(result.fallback_count, 2);
    }

    #[tokio::test]
    async fn test_all_fail_reports_last_provider() {
        let a = MockProvider::new("a", Behavior::Fail);
        let b = MockProvider::new("b", Behavior::Fail);
        let c = MockProvider::new("c", Behavior::Fail);
        let exec = executor(&["a", "b", "c"], vec![a, b, c]);

        let err = exec
            .execute(&messages(), &CompletionOptions::default(), None)
            .await
            .unwrap_err();

        match err {
            LlmError::AllProvidersExhausted {
                last_provider,
                attempted,
                message,
            } => {
                assert_eq!(last_provider, "c");
                assert_eq!(attempted, vec!["a", "b", "c"]);
                assert!(message.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fallback_disabled_stops_after_first_failure() {
        let a = MockProvider::new("a", Behavior::Fail);
        let b = MockProvider::new("b", Behavior::Reply("never".to_string()));
        let b_calls = b.calls.clone();
        let mut exec = executor(&["a", "b"], vec![a, b]);
        exec.fallback.enabled = false;

        let err = exec
            .execute(&messages(), &CompletionOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AllProvidersExhausted { ref last_provider, .. } if last_provider == "a"));
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skips_unconfigured_disabled_and_unavailable() {
        let down = MockProvider::new("down", Behavior::Reply("no".to_string())).unavailable();
        let down_calls = down.calls.clone();
        let off = MockProvider::new("off", Behavior::Reply("no".to_string()));
        let off_calls = off.calls.clone();
        let ok = MockProvider::new("ok", Behavior::Reply("yes".to_string()));

        let mut exec = ProviderExecutor::new(fallback(&["ghost", "down", "off", "ok"]));
        exec.register(provider_config("down"), BoxLlmProvider::new(down));
        let mut off_config = provider_config("off");
        off_config.enabled = false;
        exec.register(off_config, BoxLlmProvider::new(off));
        exec.register(provider_config("ok"), BoxLlmProvider::new(ok));

        let result = exec
            .execute(&messages(), &CompletionOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(result.provider, "ok");
        assert_eq!(result.fallback_count, 0);
        assert_eq!(down_calls.load(Ordering::SeqCst), 0);
        assert_eq!(off_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nothing_available_is_exhausted() {
        let exec = executor(&["ghost"], vec![]);
        let err = exec
            .execute(&messages(), &CompletionOptions::default(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no configured provider was available"));
    }

    #[tokio::test]
    async fn test_model_override_applies_to_preferred_only() {
        let grok = MockProvider::new("grok", Behavior::Fail);
        let grok_model = grok.seen_model.clone();
        let openai = MockProvider::new("openai", Behavior::Reply("ok".to_string()));
        let openai_model = openai.seen_model.clone();
        let exec = executor(&["openai"], vec![grok, openai]);

        let options = CompletionOptions {
            model: Some("grok-4".to_string()),
            ..Default::default()
        };
        let result = exec.execute(&messages(), &options, Some("grok")).await.unwrap();

        assert_eq!(result.provider, "openai");
        assert_eq!(grok_model.lock().unwrap().as_deref(), Some("grok-4"));
        assert_eq!(openai_model.lock().unwrap().as_deref(), Some("openai-model"));
    }

    #[tokio::test]
    async fn test_open_circuit_is_skipped() {
        let flaky = MockProvider::new("flaky", Behavior::Fail);
        let flaky_calls = flaky.calls.clone();
        let backup = MockProvider::new("backup", Behavior::Reply("ok".to_string()));
        let exec = executor(&["flaky", "backup"], vec![flaky, backup]);

        for _ in 0..4 {
            exec.execute(&messages(), &CompletionOptions::default(), None)
                .await
                .unwrap();
        }
        // Circuit opens after three consecutive failures.
        assert_eq!(flaky_calls.load(Ordering::SeqCst), 3);
        assert_eq!(exec.status()[0].circuit_state, "open");
    }
}
