//! Narrow "issue a generation" interface.
//!
//! The compactor, reasoning loop, and memory extractor depend on this trait
//! rather than on the executor or the chat orchestrator.

use std::future::Future;

use confidant_types::llm::{CompletionOptions, CompletionResult, LlmError, Message};

/// Anything that can turn an ordered message list into a completion.
pub trait Completer: Send + Sync {
    fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> impl Future<Output = Result<CompletionResult, LlmError>> + Send;

    /// Complete, trying `preferred` first when the implementation can route.
    fn complete_preferring(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        preferred: Option<&str>,
    ) -> impl Future<Output = Result<CompletionResult, LlmError>> + Send {
        let _ = preferred;
        self.complete(messages, options)
    }
}
