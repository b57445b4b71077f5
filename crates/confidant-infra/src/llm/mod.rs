//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `confidant-core`, plus the factory that turns the
//! `[[providers]]` entries of `confidant.toml` into a [`ProviderExecutor`].
//!
//! [`LlmProvider`]: confidant_core::llm::provider::LlmProvider

pub mod openai_compat;

use confidant_core::llm::box_provider::BoxLlmProvider;
use confidant_core::llm::executor::ProviderExecutor;
use confidant_types::config::CompanionConfig;
use confidant_types::llm::{LlmError, ProviderConfig, ProviderKind};

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// `lookup` resolves environment variables (normally `std::env::var(..).ok()`).
/// A missing key is not an error here: the provider is registered and its
/// availability probe reports it as unusable.
pub fn create_provider(
    config: &ProviderConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BoxLlmProvider, LlmError> {
    match config.kind {
        ProviderKind::OpenAiCompatible => {
            let resolved = OpenAiCompatConfig::resolve(config, lookup);
            if resolved.requires_key && resolved.api_key.is_none() {
                tracing::warn!(
                    provider = %config.name,
                    "No API key found; provider will be skipped until one is set"
                );
            }
            Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(resolved)?))
        }
    }
}

/// Build the fallback executor from the configured providers.
///
/// Entries that fail to construct are logged and left out.
pub fn build_executor(
    config: &CompanionConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ProviderExecutor {
    let mut executor = ProviderExecutor::new(config.fallback.clone());
    for entry in &config.providers {
        match create_provider(entry, &lookup) {
            Ok(provider) => {
                tracing::debug!(provider = %entry.name, model = %entry.model, "Registered provider");
                executor.register(entry.clone(), provider);
            }
            Err(e) => {
                tracing::error!(provider = %entry.name, error = %e, "Failed to create provider");
            }
        }
    }
    executor
}

/// Read an environment variable, treating unset and non-UTF-8 alike.
pub fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind: ProviderKind::OpenAiCompatible,
            base_url: None,
            model: format!("{name}-model"),
            api_key_env: None,
            enabled: true,
            timeout_secs: 30,
            max_output_tokens: 256,
        }
    }

    #[tokio::test]
    async fn test_create_provider_by_name() {
        let provider = create_provider(&entry("grok"), |_| Some("key".to_string())).unwrap();
        assert_eq!(provider.name(), "grok");
        assert_eq!(provider.default_model(), "grok-model");
        assert!(provider.probe().await);
    }

    #[tokio::test]
    async fn test_missing_key_fails_probe() {
        let provider = create_provider(&entry("openai"), |_| None).unwrap();
        assert!(!provider.probe().await);

        let local = create_provider(&entry("ollama"), |_| None).unwrap();
        assert!(local.probe().await);
    }

    #[test]
    fn test_build_executor_registers_all() {
        let mut config = CompanionConfig::default();
        config.providers = vec![entry("grok"), entry("openai")];
        config.fallback.order = vec!["grok".to_string(), "openai".to_string()];

        let executor = build_executor(&config, |_| None);
        assert_eq!(executor.provider_names(), vec!["grok", "openai"]);
        assert_eq!(executor.provider_order(Some("openai")), vec!["openai", "grok"]);
    }
}
