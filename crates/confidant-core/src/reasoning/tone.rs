//! Lexical tone inference.

use confidant_types::reasoning::SuggestedTone;

const HUMOR_MARKERS: &[&str] = &["lol", "lmao", "haha", "hehe", "rofl", "xd", ":)", ":d", ";)", "😂", "🤣", "😄"];
const POLITE_MARKERS: &[&str] = &["please", "thank", "thx", "could you", "would you", "kindly", "sorry"];
const BRIEF_WORDS: usize = 4;

/// Infer the tone the reply should take from the user's message.
///
/// Emphasis wins over humor, humor over politeness, and a very short
/// message with no other cue asks for a concise reply.
pub fn infer_tone(text: &str) -> SuggestedTone {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = text.split_whitespace().collect();

    if is_emphatic(text, &words) {
        SuggestedTone::Emphatic
    } else if words_or_markers(&lowered, HUMOR_MARKERS) {
        SuggestedTone::Playful
    } else if words_or_markers(&lowered, POLITE_MARKERS) {
        SuggestedTone::Polite
    } else if !words.is_empty() && words.len() <= BRIEF_WORDS {
        SuggestedTone::Concise
    } else {
        SuggestedTone::Neutral
    }
}

fn words_or_markers(lowered: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| {
        if m.chars().all(char::is_alphabetic) && !m.contains(' ') {
            lowered
                .split(|c: char| !c.is_alphanumeric())
                .any(|w| w.starts_with(m))
        } else {
            lowered.contains(m)
        }
    })
}

fn is_emphatic(text: &str, words: &[&str]) -> bool {
    if text.contains("!!") {
        return true;
    }
    let shouted = words
        .iter()
        .filter(|w| {
            let letters: Vec<char> = w.chars().filter(|c| c.is_alphabetic()).collect();
            letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase())
        })
        .count();
    shouted >= 2
}
