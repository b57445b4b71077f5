//! LlmProvider trait definition.
//!
//! This is the core abstraction that every language-model backend implements.
//! Uses RPITIT for the async methods; `BoxLlmProvider` supplies dynamic dispatch.

use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends (OpenAI, Grok, OpenRouter, ...).
///
/// Implementations live in confidant-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Provider name used in fallback order and result attribution.
    fn name(&self) -> &str;

    /// Model used when the caller does not override it.
    fn default_model(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Cheap availability probe run before each attempt.
    ///
    /// Returns false when the provider cannot possibly serve a request right
    /// now (e.g., its API key is missing).
    fn probe(&self) -> impl std::future::Future<Output = bool> + Send;
}
