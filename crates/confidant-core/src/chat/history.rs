//! Short-term, process-local cache of in-context messages per conversation.

use dashmap::DashMap;

use confidant_types::chat::{ConversationId, ConversationMessage};

/// Per-conversation message cache, refilled from the repository on miss.
#[derive(Default)]
pub struct HistoryCache {
    entries: DashMap<ConversationId, Vec<ConversationMessage>>,
}

impl HistoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<Vec<ConversationMessage>> {
        self.entries.get(conversation_id).map(|e| e.value().clone())
    }

    pub fn set(&self, conversation_id: &ConversationId, messages: Vec<ConversationMessage>) {
        self.entries.insert(conversation_id.clone(), messages);
    }

    /// Append to a cached conversation. A missing entry stays missing so the
    /// next read reloads the full history instead of a partial tail.
    pub fn append(&self, conversation_id: &ConversationId, messages: &[ConversationMessage]) {
        if let Some(mut entry) = self.entries.get_mut(conversation_id) {
            entry.extend_from_slice(messages);
        }
    }

    pub fn evict(&self, conversation_id: &ConversationId) {
        self.entries.remove(conversation_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
