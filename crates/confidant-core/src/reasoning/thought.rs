//! Parsing of the model's structured reasoning step.
//!
//! Models wrap JSON in code fences, prepend chatter, or ignore the format
//! entirely. Parsing never fails outright: anything unusable comes back as a
//! [`RawFallback`] that converts into a neutral `respond` thought.

use serde::Deserialize;

use confidant_types::reasoning::{ReasoningAction, Thought};

/// Confidence given to a thought whose confidence could not be read.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Raw text that could not be parsed into a [`Thought`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawFallback {
    pub raw: String,
    pub reason: String,
}

impl RawFallback {
    /// Treat the raw text as analysis and respond with neutral confidence.
    pub fn into_thought(self) -> Thought {
        Thought {
            analysis: self.raw.trim().to_string(),
            action: ReasoningAction::Respond,
            action_target: None,
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawThought {
    #[serde(default)]
    analysis: String,
    action: String,
    #[serde(default, alias = "target")]
    action_target: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Parse one reasoning step.
pub fn parse_thought(raw: &str) -> Result<Thought, RawFallback> {
    let fallback = |reason: String| RawFallback {
        raw: raw.to_string(),
        reason,
    };

    let body = json_span(raw).ok_or_else(|| fallback("no JSON object found".to_string()))?;
    let parsed: RawThought =
        serde_json::from_str(body).map_err(|e| fallback(format!("invalid JSON: {e}")))?;
    let action: ReasoningAction = parsed.action.parse().map_err(fallback)?;

    let confidence = match parsed.confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => FALLBACK_CONFIDENCE,
    };

    Ok(Thought {
        analysis: parsed.analysis.trim().to_string(),
        action,
        action_target: parsed
            .action_target
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        confidence,
    })
}

/// The outermost `{ ... }` span, ignoring code fences and surrounding prose.
fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_json() {
        let thought = parse_thought(
            r#"{"analysis":"needs memory","action":"recall_memory","action_target":"favorite game","confidence":0.6}"#,
        )
        .unwrap();
        assert_eq!(thought.action, ReasoningAction::RecallMemory);
        assert_eq!(thought.action_target.as_deref(), Some("favorite game"));
        assert!((thought.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_parses_fenced_json_with_prose() {
        let raw = "Sure, here it is:\n```json\n{\"analysis\": \"ok\", \"action\": \"respond\", \"confidence\": 0.9}\n```";
        let thought = parse_thought(raw).unwrap();
        assert_eq!(thought.action, ReasoningAction::Respond);
        assert_eq!(thought.action_target, None);
    }

    #[test]
    fn test_confidence_is_clamped_and_defaulted() {
        let high = parse_thought(r#"{"action":"respond","confidence":3.0}"#).unwrap();
        assert_eq!(high.confidence, 1.0);
        let missing = parse_thought(r#"{"action":"reflect"}"#).unwrap();
        assert_eq!(missing.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_empty_target_becomes_none() {
        let thought = parse_thought(r#"{"action":"clarify","target":"  "}"#).unwrap();
        assert_eq!(thought.action_target, None);
    }

    #[test]
    fn test_free_text_falls_back_to_respond() {
        let err = parse_thought("I think I should just answer.").unwrap_err();
        let thought = err.into_thought();
        assert_eq!(thought.action, ReasoningAction::Respond);
        assert_eq!(thought.confidence, 0.5);
        assert_eq!(thought.analysis, "I think I should just answer.");
    }

    #[test]
    fn test_unknown_action_falls_back() {
        let err = parse_thought(r#"{"action":"dance","confidence":0.9}"#).unwrap_err();
        assert!(err.reason.contains("dance"));
        assert_eq!(err.into_thought().action, ReasoningAction::Respond);
    }
}
