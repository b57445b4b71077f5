//! Reasoning-loop types for Confidant.
//!
//! A reasoning trace is built and discarded within a single request; it is
//! never persisted.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Action chosen by a single reasoning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningAction {
    Respond,
    RecallMemory,
    StoreMemory,
    AnalyzeContext,
    ConsiderTone,
    Reflect,
    Clarify,
    WebSearch,
}

impl fmt::Display for ReasoningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningAction::Respond => write!(f, "respond"),
            ReasoningAction::RecallMemory => write!(f, "recall_memory"),
            ReasoningAction::StoreMemory => write!(f, "store_memory"),
            ReasoningAction::AnalyzeContext => write!(f, "analyze_context"),
            ReasoningAction::ConsiderTone => write!(f, "consider_tone"),
            ReasoningAction::Reflect => write!(f, "reflect"),
            ReasoningAction::Clarify => write!(f, "clarify"),
            ReasoningAction::WebSearch => write!(f, "web_search"),
        }
    }
}

impl FromStr for ReasoningAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "respond" => Ok(ReasoningAction::Respond),
            "recall_memory" => Ok(ReasoningAction::RecallMemory),
            "store_memory" => Ok(ReasoningAction::StoreMemory),
            "analyze_context" => Ok(ReasoningAction::AnalyzeContext),
            "consider_tone" => Ok(ReasoningAction::ConsiderTone),
            "reflect" => Ok(ReasoningAction::Reflect),
            "clarify" => Ok(ReasoningAction::Clarify),
            "web_search" => Ok(ReasoningAction::WebSearch),
            other => Err(format!("invalid reasoning action: '{other}'")),
        }
    }
}

/// One structured decision from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub analysis: String,
    pub action: ReasoningAction,
    pub action_target: Option<String>,
    /// Clamped to [0, 1].
    pub confidence: f32,
}

/// Tone suggested for the final reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedTone {
    Playful,
    Polite,
    Concise,
    Emphatic,
    Neutral,
}

impl SuggestedTone {
    /// Instruction line folded into the final prompt.
    pub fn guidance(&self) -> &'static str {
        match self {
            SuggestedTone::Playful => "Match the user's playful mood; light humor is welcome.",
            SuggestedTone::Polite => "The user is being courteous; answer warmly and politely.",
            SuggestedTone::Concise => "The user writes tersely; keep the answer short and direct.",
            SuggestedTone::Emphatic => {
                "The user is emphatic; acknowledge the urgency and be clear."
            }
            SuggestedTone::Neutral => "Use a natural, friendly tone.",
        }
    }
}

impl fmt::Display for SuggestedTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestedTone::Playful => write!(f, "playful"),
            SuggestedTone::Polite => write!(f, "polite"),
            SuggestedTone::Concise => write!(f, "concise"),
            SuggestedTone::Emphatic => write!(f, "emphatic"),
            SuggestedTone::Neutral => write!(f, "neutral"),
        }
    }
}

/// Ordered record of a reasoning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub thoughts: Vec<Thought>,
    pub observations: Vec<String>,
    pub final_action: Option<ReasoningAction>,
    pub final_confidence: f32,
    pub suggested_tone: Option<SuggestedTone>,
    pub clarification_topic: Option<String>,
}

impl ReasoningTrace {
    pub fn iterations(&self) -> usize {
        self.thoughts.len()
    }

    /// Fold observations, tone, and clarification note into one block.
    ///
    /// Returns `None` when the pass produced nothing worth adding.
    pub fn enriched_context(&self) -> Option<String> {
        let mut sections = Vec::new();

        if !self.observations.is_empty() {
            let mut block = String::from("Notes from reasoning:");
            for obs in &self.observations {
                block.push_str("\n- ");
                block.push_str(obs);
            }
            sections.push(block);
        }

        if let Some(tone) = self.suggested_tone {
            sections.push(format!("Suggested tone ({tone}): {}", tone.guidance()));
        }

        if let Some(ref topic) = self.clarification_topic {
            sections.push(format!(
                "The request may be ambiguous ({topic}). Answer with your best interpretation \
                 and briefly mention the assumption you made."
            ));
        }

        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }
}
