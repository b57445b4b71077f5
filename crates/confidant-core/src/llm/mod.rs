//! LLM provider abstractions for Confidant.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `ProviderExecutor`: ordered failover across providers
//! - `Completer`: the narrow interface other components generate through
//! - `PromptAssembler`: cache-ordered message layout
//! - `TokenEstimator`: token counting with a length fallback

pub mod box_provider;
pub mod completer;
pub mod executor;
pub mod health;
pub mod prompt;
pub mod provider;
pub mod tokens;
