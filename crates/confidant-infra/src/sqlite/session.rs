//! SQLite session repository implementation.
//!
//! Implements `SessionRepository` from `confidant-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reader for SELECTs and
//! writer for everything else.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use uuid::Uuid;

use confidant_core::chat::repository::SessionRepository;
use confidant_types::chat::{ConversationId, ConversationMessage, Session, Usage};
use confidant_types::error::RepositoryError;
use confidant_types::llm::MessageRole;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Set or replace the persona override for a server.
    pub async fn set_server_persona(
        &self,
        server_id: &str,
        persona: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO server_profiles (server_id, persona, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(server_id) DO UPDATE SET persona = excluded.persona, updated_at = excluded.updated_at",
        )
        .bind(server_id)
        .bind(persona)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    /// Remove a server's persona override. Returns whether one existed.
    pub async fn clear_server_persona(&self, server_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM server_profiles WHERE server_id = ?")
            .bind(server_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    id: String,
    conversation_id: String,
    context: String,
    context_tokens: i64,
    last_activity_at: String,
    preferred_model: Option<String>,
    last_usage: Option<String>,
    created_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            context: row.try_get("context")?,
            context_tokens: row.try_get("context_tokens")?,
            last_activity_at: row.try_get("last_activity_at")?,
            preferred_model: row.try_get("preferred_model")?,
            last_usage: row.try_get("last_usage")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let last_usage = self
            .last_usage
            .as_deref()
            .map(serde_json::from_str::<Usage>)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid last_usage: {e}")))?;

        Ok(Session {
            id,
            conversation_id: ConversationId(self.conversation_id),
            context: self.context,
            context_tokens: self.context_tokens.max(0) as u32,
            last_activity_at: parse_datetime(&self.last_activity_at)?,
            preferred_model: self.preferred_model,
            last_usage,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    session_id: String,
    role: String,
    content: String,
    created_at: String,
    include_in_context: bool,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            include_in_context: row.try_get("include_in_context")?,
        })
    }

    fn into_message(self) -> Result<ConversationMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ConversationMessage {
            id,
            session_id,
            role,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
            include_in_context: self.include_in_context,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn usage_json(usage: Option<&Usage>) -> Result<Option<String>, RepositoryError> {
    usage
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Query(e.to_string()))
}

fn rows_to_sessions(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Session>, RepositoryError> {
    rows.iter()
        .map(|row| {
            SessionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_session()
        })
        .collect()
}

impl SessionRepository for SqliteSessionRepository {
    async fn get_session_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE conversation_id = ?")
            .bind(conversation_id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn create_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO sessions (id, conversation_id, context, context_tokens, last_activity_at, preferred_model, last_usage, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.conversation_id.as_str())
        .bind(&session.context)
        .bind(i64::from(session.context_tokens))
        .bind(format_datetime(&session.last_activity_at))
        .bind(&session.preferred_model)
        .bind(usage_json(session.last_usage.as_ref())?)
        .bind(format_datetime(&session.created_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.message().contains("UNIQUE constraint failed") => {
                Err(RepositoryError::Conflict(format!(
                    "conversation '{}' already has a session",
                    session.conversation_id
                )))
            }
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn update_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE sessions SET context = ?, context_tokens = ?, last_activity_at = ?, preferred_model = ?, last_usage = ?
             WHERE id = ?",
        )
        .bind(&session.context)
        .bind(i64::from(session.context_tokens))
        .bind(format_datetime(&session.last_activity_at))
        .bind(&session.preferred_model)
        .bind(usage_json(session.last_usage.as_ref())?)
        .bind(session.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_sessions_active_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE last_activity_at >= ? ORDER BY last_activity_at ASC",
        )
        .bind(format_datetime(&since))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_to_sessions(&rows)
    }

    async fn append_exchange(&self, messages: &[ConversationMessage]) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for message in messages {
            sqlx::query(
                "INSERT INTO messages (id, session_id, role, content, created_at, include_in_context)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(message.id.to_string())
            .bind(message.session_id.to_string())
            .bind(message.role.to_string())
            .bind(&message.content)
            .bind(format_datetime(&message.created_at))
            .bind(message.include_in_context)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn get_context_messages(
        &self,
        session_id: &Uuid,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ? AND include_in_context = 1 ORDER BY seq ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(message_row.into_message()?);
        }
        Ok(messages)
    }

    async fn record_activity(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
        usage: Option<&Usage>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE sessions SET last_activity_at = ?, last_usage = ? WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(usage_json(usage)?)
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn commit_compaction(
        &self,
        session_id: &Uuid,
        summary: &str,
        summary_tokens: u32,
        removed: &[Uuid],
    ) -> Result<u64, RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut excluded = 0;
        for id in removed {
            let result = sqlx::query(
                "UPDATE messages SET include_in_context = 0 WHERE id = ? AND include_in_context = 1",
            )
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
            excluded += result.rows_affected();
        }

        let result = sqlx::query(
            "UPDATE sessions SET context = ?, context_tokens = ?, last_usage = NULL WHERE id = ?",
        )
        .bind(summary)
        .bind(i64::from(summary_tokens))
        .bind(session_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Dropping the transaction rolls the exclusions back.
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(excluded)
    }

    async fn get_server_persona(&self, server_id: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT persona FROM server_profiles WHERE server_id = ?")
            .bind(server_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| r.try_get::<String, _>("persona"))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }
}
