//! SessionRepository trait definition.
//!
//! Persistence port for sessions, their message log, and per-server metadata.
//! Follows the RPITIT repository pattern used across the core.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use confidant_types::chat::{ConversationId, ConversationMessage, Session};
use confidant_types::llm::Usage;
use confidant_types::error::RepositoryError;

/// Repository trait for session and message persistence.
///
/// Implementations live in confidant-infra (e.g., `SqliteSessionRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait SessionRepository: Send + Sync {
    /// Look up the session owned by a conversation.
    fn get_session_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    fn get_session(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    fn create_session(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist session metadata (summary, counters, activity time, usage).
    fn update_session(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Sessions with activity at or after `since`.
    fn list_sessions_active_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<Session>, RepositoryError>> + Send;

    /// Append the messages of one exchange, in order, atomically.
    fn append_exchange(
        &self,
        messages: &[ConversationMessage],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Messages still in context for a session, oldest first.
    fn get_context_messages(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationMessage>, RepositoryError>> + Send;

    /// Record a finished turn: activity time and the usage of its prompt.
    ///
    /// Leaves the summary alone so a turn never overwrites a compaction that
    /// ran while it was generating.
    fn record_activity(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
        usage: Option<&Usage>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Store a new running summary, clear the stale usage, and flag
    /// `removed` as compacted away, all or nothing.
    ///
    /// Returns the number of messages excluded.
    fn commit_compaction(
        &self,
        session_id: &Uuid,
        summary: &str,
        summary_tokens: u32,
        removed: &[Uuid],
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Persona override configured for a server, if any.
    fn get_server_persona(
        &self,
        server_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;
}
