//! Conversation, session, and message types for Confidant.
//!
//! A conversation is one chat instance on the platform side (a channel, a DM,
//! a terminal). Each conversation owns exactly one session that accumulates
//! dialogue turns and a running summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

pub use crate::llm::{MessageRole, Usage};

/// Identifier of a conversation on the chat-platform side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ConversationId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A single persisted dialogue message.
///
/// Immutable once stored. `include_in_context` flips to false when the
/// message is compacted away; the row itself is never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub include_in_context: bool,
}

impl ConversationMessage {
    pub fn new(session_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
            include_in_context: true,
        }
    }
}

/// The long-lived session behind a conversation.
///
/// Created on the first message, mutated by every turn and by compaction,
/// never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    /// Accumulated free-text summary of compacted turns.
    pub context: String,
    /// Token estimate of `context` as of the last successful compaction.
    pub context_tokens: u32,
    pub last_activity_at: DateTime<Utc>,
    /// Preferred backend, as `provider` or `provider:model`.
    pub preferred_model: Option<String>,
    /// Usage reported by the most recent generation; drives the compaction trigger.
    pub last_usage: Option<Usage>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(conversation_id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            context: String::new(),
            context_tokens: 0,
            last_activity_at: now,
            preferred_model: None,
            last_usage: None,
            created_at: now,
        }
    }

    /// Split `preferred_model` into provider name and optional model override.
    pub fn preference(&self) -> Option<(&str, Option<&str>)> {
        let raw = self.preferred_model.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once(':') {
            Some((provider, model)) if !model.is_empty() => Some((provider, Some(model))),
            Some((provider, _)) => Some((provider, None)),
            None => Some((raw, None)),
        }
    }
}

/// An inbound message event from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub conversation_id: ConversationId,
    pub author_id: Option<String>,
    pub server_id: Option<String>,
    pub content: String,
}

/// A generated reply ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub content: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
    pub fallback_count: u32,
    /// True when every provider failed and `content` is the apology text.
    pub degraded: bool,
}

/// Outcome of handling one inbound message.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Reply(Reply),
    /// Dropped by the concurrency gate; nothing is sent.
    Suppressed,
}
