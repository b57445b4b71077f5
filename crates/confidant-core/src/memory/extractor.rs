//! Background memory extraction.
//!
//! After an exchange is persisted (and for turns removed by compaction) a
//! side LLM call picks out what is worth remembering. Each item goes through
//! [`ScopedMemoryStore::create`], so importance scoring and the minimum
//! threshold apply exactly as for any other memory.
//!
//! Malformed extraction output yields no memories and a warning; the
//! conversation is never affected.

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use confidant_types::chat::ConversationMessage;
use confidant_types::error::MemoryError;
use confidant_types::llm::{CompletionOptions, LlmError, Message};
use confidant_types::memory::{MemoryRecord, MemoryScope, MemoryType, NewMemory};

use super::scoring::classify_memory_type;
use super::store::{ScopedMemoryStore, scope_for};
use crate::llm::completer::Completer;

const EXTRACTION_MAX_TOKENS: u32 = 600;

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract long-term memories from a chat between a user and a companion. Keep only what would still be useful in a future conversation.

Rules:
1. Each memory is one self-contained sentence about the user or the community
2. Skip greetings, small talk and anything the assistant said about itself
3. Skip anything the user asked to forget
4. Prefer specific facts over vague impressions

Return a JSON array. Each element must have exactly these fields:
- "content": string
- "type": one of "fact", "preference", "instruction", "context"

If nothing is worth keeping, return []

Example:
[
  {"content": "The user's name is Sam", "type": "fact"},
  {"content": "The user prefers short answers", "type": "preference"}
]"#;

#[derive(Debug, Deserialize)]
struct RawExtraction {
    content: String,
    #[serde(default, rename = "type")]
    memory_type: Option<String>,
}

/// Who extracted memories belong to.
#[derive(Debug, Clone)]
pub struct ExtractionTarget {
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub server_id: Option<String>,
}

/// Turns conversation messages into stored memories.
pub struct MemoryExtractor<C: Completer> {
    completer: Arc<C>,
    memory: Arc<ScopedMemoryStore>,
}

impl<C: Completer + 'static> MemoryExtractor<C> {
    pub fn new(completer: Arc<C>, memory: Arc<ScopedMemoryStore>) -> Self {
        Self { completer, memory }
    }

    /// Extract and store memories from `messages`.
    ///
    /// Returns the records that were stored. Items under the importance
    /// minimum are skipped; only a failed extraction call is an error.
    #[tracing::instrument(
        name = "extract_memory",
        skip_all,
        fields(
            gen_ai.operation.name = "extract",
            session_id = %target.session_id,
            message_count = messages.len(),
        )
    )]
    pub async fn extract(
        &self,
        messages: &[ConversationMessage],
        target: &ExtractionTarget,
    ) -> Result<Vec<MemoryRecord>, LlmError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let request = vec![
            Message::system(EXTRACTION_SYSTEM_PROMPT),
            Message::user(format!("<conversation>\n{transcript}\n</conversation>")),
        ];

        let result = self
            .completer
            .complete(&request, &CompletionOptions::side_call(EXTRACTION_MAX_TOKENS))
            .await?;

        let items = parse_extraction(&result.content);
        let mut stored = Vec::new();
        for item in items {
            let memory_type = item
                .memory_type
                .as_deref()
                .and_then(|t| t.parse::<MemoryType>().ok())
                .unwrap_or_else(|| classify_memory_type(&item.content));
            let preferred = match memory_type {
                MemoryType::Preference | MemoryType::Instruction | MemoryType::Fact => MemoryScope::User,
                MemoryType::Context | MemoryType::Summary => MemoryScope::Session,
            };
            let scope = scope_for(preferred, target.user_id.as_deref(), target.server_id.as_deref());

            let new = NewMemory::new(target.session_id, item.content, memory_type, scope)
                .with_user(target.user_id.clone())
                .with_server(target.server_id.clone());

            match self.memory.create(new).await {
                Ok(record) => stored.push(record),
                Err(MemoryError::BelowImportanceThreshold { importance, .. }) => {
                    tracing::debug!(importance, "Extracted memory below threshold, skipped");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to store extracted memory");
                }
            }
        }

        tracing::debug!(stored = stored.len(), "Memory extraction finished");
        Ok(stored)
    }

    /// Run [`Self::extract`] in the background. Failures are logged.
    ///
    /// Returns `None` without spawning when extraction is disabled.
    pub fn spawn(
        self: &Arc<Self>,
        messages: Vec<ConversationMessage>,
        target: ExtractionTarget,
    ) -> Option<JoinHandle<()>> {
        let config = self.memory.config();
        if !config.enabled || !config.extraction_enabled || messages.is_empty() {
            return None;
        }

        let extractor = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = extractor.extract(&messages, &target).await {
                tracing::warn!(
                    session_id = %target.session_id,
                    error = %e,
                    "Background memory extraction failed"
                );
            }
        }))
    }
}

fn parse_extraction(raw: &str) -> Vec<RawExtraction> {
    let span = match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => {
            let preview: String = raw.chars().take(200).collect();
            tracing::warn!(content_preview = %preview, "Memory extraction returned no JSON array");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<RawExtraction>>(span) {
        Ok(items) => items
            .into_iter()
            .filter(|i| !i.content.trim().is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse memory extraction JSON");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use confidant_types::config::MemoryConfig;
    use confidant_types::llm::MessageRole;

    use super::*;
    use crate::llm::tokens::TokenEstimator;
    use crate::memory::box_embedder::BoxEmbedder;
    use crate::memory::box_vector::BoxVectorMemoryStore;
    use crate::test_support::{HashEmbedder, InMemoryVectorStore, ScriptedCompleter};

    fn extractor(
        completer: ScriptedCompleter,
        vectors: InMemoryVectorStore,
        min_importance: f32,
    ) -> Arc<MemoryExtractor<ScriptedCompleter>> {
        let memory = ScopedMemoryStore::new(
            BoxVectorMemoryStore::new(vectors),
            BoxEmbedder::new(HashEmbedder),
            TokenEstimator::heuristic(),
            MemoryConfig {
                min_importance,
                ..Default::default()
            },
        );
        Arc::new(MemoryExtractor::new(Arc::new(completer), Arc::new(memory)))
    }

    fn exchange(session_id: Uuid) -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::new(session_id, MessageRole::User, "I'm Sam and I love chess"),
            ConversationMessage::new(session_id, MessageRole::Assistant, "Nice to meet you, Sam!"),
        ]
    }

    const REPLY: &str = r#"```json
[
  {"content": "The user's name is Sam", "type": "fact"},
  {"content": "The user loves chess", "type": "preference"},
  {"content": "They were chatting in the evening", "type": "context"}
]
```"#;

    fn target(session_id: Uuid, user: Option<&str>) -> ExtractionTarget {
        ExtractionTarget {
            session_id,
            user_id: user.map(str::to_string),
            server_id: None,
        }
    }

    #[tokio::test]
    async fn test_extracts_and_scopes_memories() {
        let vectors = InMemoryVectorStore::default();
        let extractor = extractor(ScriptedCompleter::new([REPLY]), vectors.clone(), 0.45);
        let session = Uuid::now_v7();

        let stored = extractor
            .extract(&exchange(session), &target(session, Some("u1")))
            .await
            .unwrap();

        // context at session scope scores 0.4 and is skipped
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.scope == MemoryScope::User));
        assert!(stored.iter().all(|r| r.user_id.as_deref() == Some("u1")));
        assert_eq!(vectors.len(), 2);
    }

    #[tokio::test]
    async fn test_without_user_everything_is_session_scoped() {
        let vectors = InMemoryVectorStore::default();
        let extractor = extractor(ScriptedCompleter::new([REPLY]), vectors.clone(), 0.3);
        let session = Uuid::now_v7();

        let stored = extractor.extract(&exchange(session), &target(session, None)).await.unwrap();

        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|r| r.scope == MemoryScope::Session));
    }

    #[tokio::test]
    async fn test_malformed_output_stores_nothing() {
        let vectors = InMemoryVectorStore::default();
        let extractor = extractor(
            ScriptedCompleter::new(["I could not find anything."]),
            vectors.clone(),
            0.3,
        );
        let session = Uuid::now_v7();

        let stored = extractor.extract(&exchange(session), &target(session, None)).await.unwrap();
        assert!(stored.is_empty());
        assert_eq!(vectors.len(), 0);
    }

    #[tokio::test]
    async fn test_spawned_failure_is_contained() {
        let completer = ScriptedCompleter::default();
        completer.push_error("down");
        let extractor = extractor(completer.clone(), InMemoryVectorStore::default(), 0.3);
        let session = Uuid::now_v7();

        let handle = extractor.spawn(exchange(session), target(session, None)).unwrap();
        handle.await.unwrap();
        assert_eq!(completer.calls(), 1);
    }

    #[test]
    fn test_untyped_items_are_classified() {
        let items = parse_extraction(r#"[{"content": "Please always call me Sam"}, {"content": " "}]"#);
        assert_eq!(items.len(), 1);
        assert_eq!(classify_memory_type(&items[0].content), MemoryType::Instruction);
    }
}
