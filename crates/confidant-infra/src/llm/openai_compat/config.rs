//! Configuration and per-provider presets for OpenAI-compatible backends.
//!
//! Every backend that speaks the chat completions protocol gets a preset with
//! its base URL, the environment variable conventionally holding its key, and
//! how it accepts a conversation identifier for prompt-cache routing.

use std::time::Duration;

use secrecy::SecretString;

use confidant_types::llm::ProviderConfig;

/// Well-known defaults for a named backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub base_url: &'static str,
    /// Environment variable read when the config names none.
    pub key_env: Option<&'static str>,
    /// Whether requests are rejected without a key.
    pub requires_key: bool,
    /// Header carrying the conversation id, for backends that route caches by header.
    pub conversation_header: Option<&'static str>,
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        key_env: Some("OPENAI_API_KEY"),
        requires_key: true,
        conversation_header: None,
    },
    Preset {
        name: "grok",
        base_url: "https://api.x.ai/v1",
        key_env: Some("XAI_API_KEY"),
        requires_key: true,
        conversation_header: Some("x-grok-conv-id"),
    },
    Preset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        key_env: Some("OPENROUTER_API_KEY"),
        requires_key: true,
        conversation_header: None,
    },
    Preset {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        key_env: Some("GROQ_API_KEY"),
        requires_key: true,
        conversation_header: None,
    },
    Preset {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        key_env: None,
        requires_key: false,
        conversation_header: None,
    },
];

/// Look up a preset by provider name. `xai` is accepted for Grok.
pub fn preset_for(name: &str) -> Option<&'static Preset> {
    let name = match name.to_ascii_lowercase().as_str() {
        "xai" | "x.ai" => "grok".to_string(),
        other => other.to_string(),
    };
    PRESETS.iter().find(|p| p.name == name)
}

/// Resolved settings for one [`super::OpenAiCompatibleProvider`].
///
/// The API key is a [`SecretString`]; this type does not derive `Debug`.
pub struct OpenAiCompatConfig {
    pub provider_name: String,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub requires_key: bool,
    pub conversation_header: Option<String>,
    pub timeout: Duration,
}

impl OpenAiCompatConfig {
    /// Resolve a provider entry from `confidant.toml`.
    ///
    /// `lookup` reads an environment variable; tests pass a closure instead of
    /// touching the process environment.
    pub fn resolve(config: &ProviderConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let preset = preset_for(&config.name);

        let base_url = config
            .base_url
            .clone()
            .or_else(|| preset.map(|p| p.base_url.to_string()))
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let key_env = config
            .api_key_env
            .as_deref()
            .or_else(|| preset.and_then(|p| p.key_env));
        let api_key = key_env
            .and_then(&lookup)
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        Self {
            provider_name: config.name.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            requires_key: preset.is_none_or(|p| p.requires_key),
            conversation_header: preset
                .and_then(|p| p.conversation_header)
                .map(str::to_string),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind: confidant_types::llm::ProviderKind::OpenAiCompatible,
            base_url: None,
            model: "some-model".to_string(),
            api_key_env: None,
            enabled: true,
            timeout_secs: 20,
            max_output_tokens: 512,
        }
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(preset_for("grok").unwrap().base_url, "https://api.x.ai/v1");
        assert_eq!(preset_for("xAI").unwrap().name, "grok");
        assert!(!preset_for("ollama").unwrap().requires_key);
        assert!(preset_for("mystery").is_none());
    }

    #[test]
    fn test_resolve_uses_preset_key_env() {
        let config = OpenAiCompatConfig::resolve(&provider("grok"), |var| {
            (var == "XAI_API_KEY").then(|| "xai-secret".to_string())
        });
        assert_eq!(config.base_url, "https://api.x.ai/v1");
        assert_eq!(config.api_key.unwrap().expose_secret(), "xai-secret");
        assert_eq!(config.conversation_header.as_deref(), Some("x-grok-conv-id"));
        assert_eq!(config.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_resolve_explicit_overrides() {
        let mut entry = provider("grok");
        entry.base_url = Some("http://proxy.local/v1/".to_string());
        entry.api_key_env = Some("MY_KEY".to_string());
        let config = OpenAiCompatConfig::resolve(&entry, |var| {
            (var == "MY_KEY").then(|| "mine".to_string())
        });
        assert_eq!(config.base_url, "http://proxy.local/v1");
        assert_eq!(config.api_key.unwrap().expose_secret(), "mine");
    }

    #[test]
    fn test_resolve_blank_key_is_missing() {
        let config = OpenAiCompatConfig::resolve(&provider("openai"), |_| Some("  ".to_string()));
        assert!(config.api_key.is_none());
        assert!(config.requires_key);
    }

    #[test]
    fn test_unknown_provider_defaults_to_openai_url() {
        let config = OpenAiCompatConfig::resolve(&provider("custom"), |_| None);
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert!(config.requires_key);
        assert!(config.conversation_header.is_none());
    }
}
