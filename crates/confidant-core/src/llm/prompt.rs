//! Cache-ordered prompt assembly.
//!
//! Providers that cache by prefix only reuse work up to the first byte that
//! changed, so the message list is laid out from most to least stable:
//!
//! ```text
//! [system]    persona                      (stable for the server)
//! [system]    <conversation_summary>       (changes on compaction only)
//! [user/asst] dialogue turns, oldest first (append-only between compactions)
//! [system]    <volatile_context>           (memories, reasoning notes; never persisted)
//! ```

use confidant_types::chat::ConversationMessage;
use confidant_types::llm::{Message, MessageRole};

/// Builds the final generation message list.
pub struct PromptAssembler;

impl PromptAssembler {
    /// Assemble persona, running summary, turns, and the volatile tail.
    ///
    /// System-role entries in `turns` are dropped: the only system content is
    /// what this function places itself.
    pub fn build(
        persona: &str,
        summary: &str,
        turns: &[ConversationMessage],
        volatile: Option<&str>,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(turns.len() + 3);

        if !persona.trim().is_empty() {
            messages.push(Message::system(persona.trim()));
        }

        if !summary.trim().is_empty() {
            messages.push(Message::system(format!(
                "<conversation_summary>\n{}\n</conversation_summary>",
                summary.trim()
            )));
        }

        messages.extend(
            turns
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(|m| Message {
                    role: m.role,
                    content: m.content.clone(),
                }),
        );

        if let Some(volatile) = volatile.map(str::trim).filter(|v| !v.is_empty()) {
            messages.push(Message::system(format!(
                "<volatile_context>\n{volatile}\n</volatile_context>"
            )));
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn turns() -> Vec<ConversationMessage> {
        let session = Uuid::now_v7();
        vec![
            ConversationMessage::new(session, MessageRole::User, "hello"),
            ConversationMessage::new(session, MessageRole::Assistant, "hi!"),
            ConversationMessage::new(session, MessageRole::User, "what do I like?"),
        ]
    }

    #[test]
    fn test_stable_prefix_then_turns_then_volatile() {
        let messages = PromptAssembler::build(
            "You are Confidant.",
            "User is named Sam.",
            &turns(),
            Some("From your previous conversations:\n- likes chess"),
        );

        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0], Message::system("You are Confidant."));
        assert!(messages[1].content.contains("User is named Sam."));
        assert_eq!(messages[2].role, MessageRole::User);
        assert_eq!(messages[4].content, "what do I like?");
        assert_eq!(messages[5].role, MessageRole::System);
        assert!(messages[5].content.contains("likes chess"));
    }

    #[test]
    fn test_volatile_tail_does_not_change_prefix() {
        let a = PromptAssembler::build("persona", "summary", &turns(), Some("memory A"));
        let b = PromptAssembler::build("persona", "summary", &turns(), Some("memory B"));
        assert_eq!(a[..a.len() - 1], b[..b.len() - 1]);
        assert_ne!(a.last(), b.last());
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let messages = PromptAssembler::build("persona", "  ", &turns(), Some(""));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[3].role, MessageRole::User);
    }

    #[test]
    fn test_system_turns_are_filtered() {
        let mut history = turns();
        history.push(ConversationMessage::new(
            Uuid::now_v7(),
            MessageRole::System,
            "stray",
        ));
        let messages = PromptAssembler::build("persona", "", &history, None);
        assert!(messages.iter().all(|m| m.content != "stray"));
    }
}
