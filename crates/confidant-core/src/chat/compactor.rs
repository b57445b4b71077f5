//! History compaction.
//!
//! Keeps the prompt inside `max_context_tokens` by folding the oldest
//! dialogue turns into the session's running summary. Removal is always an
//! even count so a user message never loses its reply. When the running
//! summary itself outgrows a quarter of the budget it is condensed again.

use std::sync::Arc;

use uuid::Uuid;

use confidant_types::chat::ConversationMessage;
use confidant_types::config::CompactionConfig;
use confidant_types::error::CompactionError;
use confidant_types::llm::{CompletionOptions, Message, Usage};

use crate::llm::completer::Completer;
use crate::llm::tokens::TokenEstimator;

/// Neutral summarization instruction; no persona voice.
const SUMMARY_SYSTEM_PROMPT: &str = r#"You compress chat history for later reference. Summarize the conversation segment below objectively. Preserve:
1. Facts the participants stated about themselves
2. Decisions, requests and open questions
3. The topic the conversation was on when the segment ends

Write plain third-person prose ("The user asked...", "The assistant suggested..."). No greetings, no commentary, no roleplay."#;

/// Instruction for condensing a summary of summaries.
const CONSOLIDATION_SYSTEM_PROMPT: &str = r#"The text below is a running summary of a long conversation, built up from several partial summaries. Rewrite it as one concise paragraph. Keep every durable fact, preference and unresolved question; drop repetition and anything superseded by later information."#;

/// Result of one compaction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionOutcome {
    pub removed_count: usize,
    pub removed_ids: Vec<Uuid>,
    /// Running summary after the pass.
    pub summary: String,
    pub summary_tokens: u32,
    /// Estimated tokens of the messages left in context.
    pub kept_tokens: u32,
}

/// Summarizes and evicts old turns through a [`Completer`].
pub struct HistoryCompactor<C: Completer> {
    completer: Arc<C>,
    tokens: TokenEstimator,
    max_context_tokens: u32,
}

impl<C: Completer> HistoryCompactor<C> {
    pub fn new(completer: Arc<C>, tokens: TokenEstimator, config: &CompactionConfig) -> Self {
        Self {
            completer,
            tokens,
            max_context_tokens: config.max_context_tokens,
        }
    }

    pub fn max_context_tokens(&self) -> u32 {
        self.max_context_tokens
    }

    pub fn tokens(&self) -> &TokenEstimator {
        &self.tokens
    }

    /// Token count the kept history must fall below.
    pub fn target_tokens(&self) -> u32 {
        self.max_context_tokens / 2
    }

    fn summary_cap(&self) -> u32 {
        (self.max_context_tokens / 4).max(1)
    }

    /// Whether the last generation's usage puts the session over budget.
    /// Cached prompt tokens count half.
    pub fn should_compact(&self, usage: &Usage) -> bool {
        let cached = usage.cached_tokens.unwrap_or(0);
        usage.total_tokens.saturating_sub(cached / 2) > self.max_context_tokens
    }

    /// Number of oldest messages to remove. Always even.
    pub fn plan(&self, messages: &[ConversationMessage]) -> usize {
        let target = self.target_tokens();
        let mut kept: u32 = messages.iter().map(|m| self.tokens.estimate(&m.content)).sum();
        let mut removed = 0;

        for message in messages {
            if kept < target && removed % 2 == 0 {
                break;
            }
            kept = kept.saturating_sub(self.tokens.estimate(&message.content));
            removed += 1;
        }

        if removed % 2 == 1 {
            removed -= 1;
        }
        removed
    }

    /// Fold the oldest messages into `existing_summary`.
    ///
    /// Returns an outcome with `removed_count == 0` and no LLM call when
    /// nothing needs removing. On error nothing has been changed.
    #[tracing::instrument(
        name = "compact_history",
        skip_all,
        fields(
            gen_ai.operation.name = "summarize",
            message_count = messages.len(),
            max_context_tokens = self.max_context_tokens,
        )
    )]
    pub async fn compact(
        &self,
        messages: &[ConversationMessage],
        existing_summary: &str,
    ) -> Result<CompactionOutcome, CompactionError> {
        let removed_count = self.plan(messages);
        let (removed, kept) = messages.split_at(removed_count);
        let kept_tokens = self.tokens.estimate_all(kept.iter().map(|m| m.content.as_str()));

        if removed.is_empty() {
            return Ok(CompactionOutcome {
                removed_count: 0,
                removed_ids: Vec::new(),
                summary: existing_summary.to_string(),
                summary_tokens: self.tokens.estimate(existing_summary),
                kept_tokens,
            });
        }

        let summary = self.fold(removed, existing_summary).await?;

        let summary_tokens = self.tokens.estimate(&summary);
        tracing::info!(
            removed = removed_count,
            kept_tokens,
            summary_tokens,
            "History compacted"
        );

        Ok(CompactionOutcome {
            removed_count,
            removed_ids: removed.iter().map(|m| m.id).collect(),
            summary,
            summary_tokens,
            kept_tokens,
        })
    }

    /// Summarize `messages` onto the end of `existing_summary`, condensing
    /// the result when it outgrows a quarter of the budget.
    pub async fn fold(
        &self,
        messages: &[ConversationMessage],
        existing_summary: &str,
    ) -> Result<String, CompactionError> {
        let fresh = self.summarize(messages).await?;
        let summary = if existing_summary.trim().is_empty() {
            fresh
        } else {
            format!("{}\n\n{}", existing_summary.trim(), fresh)
        };

        if self.tokens.estimate(&summary) <= self.summary_cap() {
            return Ok(summary);
        }
        match self.consolidate(&summary).await {
            Ok(condensed) => Ok(condensed),
            Err(e) => {
                tracing::warn!(error = %e, "Summary consolidation failed, keeping appended summary");
                Ok(summary)
            }
        }
    }

    /// Summarize a set of messages with the neutral prompt.
    async fn summarize(&self, messages: &[ConversationMessage]) -> Result<String, CompactionError> {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = vec![
            Message::system(SUMMARY_SYSTEM_PROMPT),
            Message::user(format!("<conversation>\n{transcript}\n</conversation>")),
        ];
        let result = self
            .completer
            .complete(&request, &CompletionOptions::side_call(self.summary_cap()))
            .await?;
        Ok(result.content.trim().to_string())
    }

    async fn consolidate(&self, summary: &str) -> Result<String, CompactionError> {
        tracing::debug!("Consolidating running summary");
        let request = vec![
            Message::system(CONSOLIDATION_SYSTEM_PROMPT),
            Message::user(summary.to_string()),
        ];
        let result = self
            .completer
            .complete(&request, &CompletionOptions::side_call(self.summary_cap()))
            .await?;
        Ok(result.content.trim().to_string())
    }
}
