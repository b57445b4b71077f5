//! Configuration types for Confidant.
//!
//! `CompanionConfig` represents the top-level `confidant.toml`. Every section
//! and field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderConfig;

/// Top-level configuration.
///
/// Loaded from `~/.confidant/confidant.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanionConfig {
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

/// Stable persona text placed at the head of every prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_persona_prompt")]
    pub system_prompt: String,
}

fn default_persona_name() -> String {
    "Confidant".to_string()
}

fn default_persona_prompt() -> String {
    "You are Confidant, a friendly and attentive chat companion. You remember what people \
     tell you, keep answers conversational, and never pretend to know things you don't."
        .to_string()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            system_prompt: default_persona_prompt(),
        }
    }
}

/// Provider ordering and fallback behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Provider names tried after the preferred one.
    #[serde(default)]
    pub order: Vec<String>,
    /// Used only when neither a preference nor an order is available.
    #[serde(default = "default_provider_name")]
    pub default_provider: String,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            order: Vec::new(),
            default_provider: default_provider_name(),
        }
    }
}

/// Scoped memory tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Memories scored below this are rejected at creation.
    #[serde(default = "default_min_importance")]
    pub min_importance: f32,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_session_top_k")]
    pub session_top_k: usize,
    #[serde(default = "default_user_top_k")]
    pub user_top_k: usize,
    #[serde(default = "default_server_top_k")]
    pub server_top_k: usize,
    /// Token budget for the rendered memory block.
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: u32,
    #[serde(default = "default_true")]
    pub extraction_enabled: bool,
    #[serde(default = "default_cleanup_max_age_days")]
    pub cleanup_max_age_days: u32,
    #[serde(default = "default_cleanup_importance_below")]
    pub cleanup_importance_below: f32,
}

fn default_min_importance() -> f32 {
    0.3
}

fn default_similarity_threshold() -> f32 {
    0.7
}

fn default_session_top_k() -> usize {
    5
}

fn default_user_top_k() -> usize {
    3
}

fn default_server_top_k() -> usize {
    2
}

fn default_context_token_budget() -> u32 {
    1000
}

fn default_cleanup_max_age_days() -> u32 {
    90
}

fn default_cleanup_importance_below() -> f32 {
    0.4
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_importance: default_min_importance(),
            similarity_threshold: default_similarity_threshold(),
            session_top_k: default_session_top_k(),
            user_top_k: default_user_top_k(),
            server_top_k: default_server_top_k(),
            context_token_budget: default_context_token_budget(),
            extraction_enabled: true,
            cleanup_max_age_days: default_cleanup_max_age_days(),
            cleanup_importance_below: default_cleanup_importance_below(),
        }
    }
}

/// History compaction budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Maximum effective prompt tokens before compaction is due.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,
}

fn default_max_context_tokens() -> u32 {
    4000
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

/// Reasoning loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_true")]
    pub self_reflection: bool,
    /// Recent turns included in each thought prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_thought_max_tokens")]
    pub thought_max_tokens: u32,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_confidence_threshold() -> f32 {
    0.8
}

fn default_history_window() -> usize {
    6
}

fn default_thought_max_tokens() -> u32 {
    300
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: default_max_iterations(),
            confidence_threshold: default_confidence_threshold(),
            self_reflection: true,
            history_window: default_history_window(),
            thought_max_tokens: default_thought_max_tokens(),
        }
    }
}

/// Concurrency gate timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,
    /// Released locks idle longer than this are evicted.
    #[serde(default = "default_lock_idle_secs")]
    pub lock_idle_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_duplicate_window_secs() -> u64 {
    5
}

fn default_lock_idle_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            duplicate_window_secs: default_duplicate_window_secs(),
            lock_idle_secs: default_lock_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Background session maintenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_scheduler_interval_secs")]
    pub interval_secs: u64,
    /// Sessions idle longer than this are refreshed.
    #[serde(default = "default_stale_after_mins")]
    pub stale_after_mins: u64,
}

fn default_scheduler_interval_secs() -> u64 {
    300
}

fn default_stale_after_mins() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_scheduler_interval_secs(),
            stale_after_mins: default_stale_after_mins(),
        }
    }
}

/// Embedding endpoint (OpenAI-compatible `/embeddings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_embedding_timeout_secs() -> u64 {
    15
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            api_key_env: default_embedding_key_env(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

/// Optional SearXNG endpoint for the `web_search` reasoning action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Base URL of a SearXNG instance; web search is disabled when unset.
    #[serde(default)]
    pub searxng_url: Option<String>,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_config_default_values() {
        let config = CompanionConfig::default();
        assert!(config.providers.is_empty());
        assert!(config.fallback.enabled);
        assert_eq!(config.memory.session_top_k, 5);
        assert_eq!(config.memory.user_top_k, 3);
        assert_eq!(config.memory.server_top_k, 2);
        assert_eq!(config.gate.duplicate_window_secs, 5);
        assert_eq!(config.gate.lock_idle_secs, 300);
        assert_eq!(config.reasoning.max_iterations, 3);
    }

    #[test]
    fn test_companion_config_deserialize_empty() {
        let config: CompanionConfig = toml::from_str("").unwrap();
        assert_eq!(config.compaction.max_context_tokens, 4000);
        assert!((config.reasoning.confidence_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.fallback.default_provider, "openai");
        assert!(config.web_search.searxng_url.is_none());
    }

    #[test]
    fn test_companion_config_deserialize_with_values() {
        let toml_str = r#"
[fallback]
order = ["grok", "openai"]
default_provider = "grok"

[[providers]]
name = "grok"
base_url = "https://api.x.ai/v1"
model = "grok-3-mini"
api_key_env = "XAI_API_KEY"
timeout_secs = 20

[[providers]]
name = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[compaction]
max_context_tokens = 500

[reasoning]
max_iterations = 5
self_reflection = false
"#;
        let config: CompanionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fallback.order, vec!["grok", "openai"]);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].timeout_secs, 20);
        assert_eq!(config.providers[1].timeout_secs, 60);
        assert_eq!(config.compaction.max_context_tokens, 500);
        assert_eq!(config.reasoning.max_iterations, 5);
        assert!(!config.reasoning.self_reflection);
        assert!(config.reasoning.enabled);
    }
}
