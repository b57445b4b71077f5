//! Memory types for Confidant.
//!
//! Long-term memories are short pieces of text tagged with a scope, a type,
//! and an importance score, and stored alongside a semantic embedding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Breadth of a memory's validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// This conversation only.
    Session,
    /// Follows a person across conversations.
    User,
    /// Shared within a community.
    Server,
}

impl fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryScope::Session => write!(f, "session"),
            MemoryScope::User => write!(f, "user"),
            MemoryScope::Server => write!(f, "server"),
        }
    }
}

impl FromStr for MemoryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session" => Ok(MemoryScope::Session),
            "user" => Ok(MemoryScope::User),
            "server" => Ok(MemoryScope::Server),
            other => Err(format!("invalid memory scope: '{other}'")),
        }
    }
}

/// Category of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Instruction,
    Context,
    Summary,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryType::Fact => write!(f, "fact"),
            MemoryType::Preference => write!(f, "preference"),
            MemoryType::Instruction => write!(f, "instruction"),
            MemoryType::Context => write!(f, "context"),
            MemoryType::Summary => write!(f, "summary"),
        }
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fact" => Ok(MemoryType::Fact),
            "preference" => Ok(MemoryType::Preference),
            "instruction" => Ok(MemoryType::Instruction),
            "context" => Ok(MemoryType::Context),
            "summary" => Ok(MemoryType::Summary),
            other => Err(format!("invalid memory type: '{other}'")),
        }
    }
}

/// A stored long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub server_id: Option<String>,
    pub scope: MemoryScope,
    pub content: String,
    pub memory_type: MemoryType,
    /// Always within [0, 1].
    pub importance: f32,
    pub estimated_tokens: u32,
    /// Opaque embedding vector; empty when loaded without vectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a memory.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub session_id: Uuid,
    pub content: String,
    pub memory_type: MemoryType,
    pub user_id: Option<String>,
    pub server_id: Option<String>,
    pub scope: MemoryScope,
    /// Explicit importance; computed from heuristics when `None`.
    pub importance: Option<f32>,
}

impl NewMemory {
    pub fn new(
        session_id: Uuid,
        content: impl Into<String>,
        memory_type: MemoryType,
        scope: MemoryScope,
    ) -> Self {
        Self {
            session_id,
            content: content.into(),
            memory_type,
            user_id: None,
            server_id: None,
            scope,
            importance: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_server(mut self, server_id: Option<String>) -> Self {
        self.server_id = server_id;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }
}

/// A memory returned by similarity search, with its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMatch {
    pub record: MemoryRecord,
    /// Cosine similarity in [-1, 1]; 1.0 when listed without a query.
    pub similarity: f32,
}

/// Field filter applied by the vector store.
///
/// `None` fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFilter {
    pub scope: Option<MemoryScope>,
    pub session_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub server_id: Option<String>,
    pub created_before: Option<DateTime<Utc>>,
    pub importance_below: Option<f32>,
}

impl MemoryFilter {
    pub fn session(session_id: Uuid) -> Self {
        Self {
            scope: Some(MemoryScope::Session),
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            scope: Some(MemoryScope::User),
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn server(server_id: impl Into<String>) -> Self {
        Self {
            scope: Some(MemoryScope::Server),
            server_id: Some(server_id.into()),
            ..Default::default()
        }
    }

    /// Whether `record` satisfies every set field.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        self.scope.is_none_or(|s| record.scope == s)
            && self.session_id.is_none_or(|id| record.session_id == id)
            && self
                .user_id
                .as_deref()
                .is_none_or(|u| record.user_id.as_deref() == Some(u))
            && self
                .server_id
                .as_deref()
                .is_none_or(|s| record.server_id.as_deref() == Some(s))
            && self.created_before.is_none_or(|t| record.created_at < t)
            && self.importance_below.is_none_or(|i| record.importance < i)
    }
}
