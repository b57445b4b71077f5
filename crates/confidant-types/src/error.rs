use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in confidant-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the scoped memory adapter.
///
/// All of these are local to a single memory call; none of them abort a
/// conversation turn.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("importance {importance:.2} is below the minimum {minimum:.2}")]
    BelowImportanceThreshold { importance: f32, minimum: f32 },

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("memory store degraded: {0}")]
    StoreDegraded(String),

    #[error("memory content is empty")]
    EmptyContent,
}

/// Errors from the embedding collaborator.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Errors from the web-search collaborator.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

/// Errors from history compaction. Logged, never surfaced to the user.
#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("summarization failed: {0}")]
    Summarization(#[from] LlmError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors surfaced by the chat orchestrator.
///
/// Provider exhaustion is not here: it becomes a degraded reply instead.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}
