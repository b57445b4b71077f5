//! Heuristic conversation analysis. No external calls.

use confidant_types::chat::ConversationMessage;
use confidant_types::llm::MessageRole;

const LONG_CONVERSATION_TURNS: usize = 20;
const SHORT_MESSAGE_CHARS: usize = 20;
const DETAILED_MESSAGE_CHARS: usize = 200;

/// Describe the shape of the conversation so far as one observation.
pub fn analyze_context(history: &[ConversationMessage], message: &str) -> String {
    let user_messages: Vec<&str> = history
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .chain(std::iter::once(message))
        .collect();

    let turns = history.len() + 1;
    let questions = user_messages.iter().filter(|m| m.contains('?')).count();
    let average_chars =
        user_messages.iter().map(|m| m.chars().count()).sum::<usize>() / user_messages.len();

    let mut notes = vec![format!(
        "Conversation has {turns} messages; {questions} of {} user messages are questions; average user message is {average_chars} characters.",
        user_messages.len()
    )];

    if turns > LONG_CONVERSATION_TURNS {
        notes.push("This is a long-running conversation; earlier points may be referenced.".to_string());
    }
    if questions * 2 > user_messages.len() {
        notes.push("The user is asking many questions; answer them directly.".to_string());
    }
    if average_chars < SHORT_MESSAGE_CHARS {
        notes.push("The user writes short messages; keep the reply brief.".to_string());
    } else if average_chars > DETAILED_MESSAGE_CHARS {
        notes.push("The user writes detailed messages; a thorough reply fits.".to_string());
    }

    notes.join(" ")
}
