//! Heuristic importance scoring and memory-type classification.

use confidant_types::memory::{MemoryScope, MemoryType};

/// Starting score before the type weight is applied.
pub const BASE_IMPORTANCE: f32 = 0.5;

/// Fixed boost for memories that outlive a single conversation.
pub const WIDE_SCOPE_BOOST: f32 = 0.1;

/// Importance given to memories the reasoning loop stores on purpose.
pub const EXPLICIT_IMPORTANCE: f32 = 0.9;

const LONG_CONTENT_CHARS: usize = 100;
const LONG_CONTENT_BOOST: f32 = 0.1;
const CUE_BOOST: f32 = 0.2;
const QUESTION_BOOST: f32 = 0.05;

const CUES: &[&str] = &["important", "remember"];

/// Multiplier applied to [`BASE_IMPORTANCE`] for each memory type.
pub fn type_weight(memory_type: MemoryType) -> f32 {
    match memory_type {
        MemoryType::Instruction => 1.3,
        MemoryType::Preference => 1.2,
        MemoryType::Fact => 1.1,
        MemoryType::Summary => 0.9,
        MemoryType::Context => 0.8,
    }
}

/// Additive boost for the scope a memory is stored at.
pub fn scope_boost(scope: MemoryScope) -> f32 {
    match scope {
        MemoryScope::Session => 0.0,
        MemoryScope::User | MemoryScope::Server => WIDE_SCOPE_BOOST,
    }
}

/// Score how worth-retaining `content` is. Always within [0, 1].
pub fn score_importance(content: &str, memory_type: MemoryType, scope: MemoryScope) -> f32 {
    let mut score = BASE_IMPORTANCE * type_weight(memory_type);

    if content.chars().count() > LONG_CONTENT_CHARS {
        score += LONG_CONTENT_BOOST;
    }

    let lowered = content.to_lowercase();
    if CUES.iter().any(|cue| lowered.contains(cue)) {
        score += CUE_BOOST;
    }

    if content.contains('?') {
        score += QUESTION_BOOST;
    }

    clamp_importance(score + scope_boost(scope))
}

/// Clamp any importance into [0, 1]; NaN becomes 0.
pub fn clamp_importance(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

const PREFERENCE_KEYWORDS: &[&str] = &[
    "favorite", "favourite", "prefer", "love", "like", "enjoy", "hate", "dislike", "into ",
];
const INSTRUCTION_KEYWORDS: &[&str] = &[
    "always", "never", "don't", "do not", "please", "should", "make sure", "call me",
];
const FACT_KEYWORDS: &[&str] = &[
    " is ", " am ", " are ", " was ", " have ", " has ", "i'm ", "my name", "i work", "i live",
    "born",
];

/// Classify free text into a memory type with keyword heuristics.
///
/// Instructions are checked first so "please always call me Sam" is not
/// mistaken for a fact.
pub fn classify_memory_type(text: &str) -> MemoryType {
    let padded = format!(" {} ", text.to_lowercase());

    if INSTRUCTION_KEYWORDS.iter().any(|k| padded.contains(k)) {
        MemoryType::Instruction
    } else if PREFERENCE_KEYWORDS.iter().any(|k| padded.contains(k)) {
        MemoryType::Preference
    } else if FACT_KEYWORDS.iter().any(|k| padded.contains(k)) {
        MemoryType::Fact
    } else {
        MemoryType::Context
    }
}
