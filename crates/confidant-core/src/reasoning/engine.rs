//! Bounded think-then-act loop run before the final generation.
//!
//! Each iteration asks the model for one structured decision, executes the
//! chosen action, and records what it learned. The loop ends on a confident
//! `respond` or when the iteration budget is spent. It never fails: provider
//! errors and malformed decisions end in a neutral `respond`.

use std::sync::Arc;

use uuid::Uuid;

use confidant_types::chat::ConversationMessage;
use confidant_types::config::ReasoningConfig;
use confidant_types::llm::{CompletionOptions, Message};
use confidant_types::memory::{MemoryScope, NewMemory};
use confidant_types::reasoning::{ReasoningAction, ReasoningTrace, Thought};

use super::context::analyze_context;
use super::search::BoxWebSearch;
use super::thought::{FALLBACK_CONFIDENCE, parse_thought};
use super::tone::infer_tone;
use crate::llm::completer::Completer;
use crate::memory::scoring::{EXPLICIT_IMPORTANCE, classify_memory_type};
use crate::memory::store::{ScopedMemoryStore, scope_for};

const WEB_RESULTS: usize = 3;
const REFLECTION_MAX_TOKENS: u32 = 200;

const THOUGHT_SYSTEM_PROMPT: &str = r#"You are the private planning step of a chat companion. Decide the single next step before the companion replies to the user. You never talk to the user here.

Return ONLY a JSON object with exactly these fields:
- "analysis": string (one or two sentences about what the user needs)
- "action": one of "respond", "recall_memory", "store_memory", "analyze_context", "consider_tone", "reflect", "clarify", "web_search"
- "action_target": string or null (memory query, fact to store, search query, or ambiguous topic)
- "confidence": number between 0 and 1 (how ready you are to answer well)

Use "recall_memory" when earlier knowledge about the user would help, "store_memory" when the user shares something worth keeping, "web_search" for current events or facts you are unsure of, and "respond" once you are ready."#;

const REFLECTION_SYSTEM_PROMPT: &str = "Critique the planning steps below in two sentences at most. Point out missing information or a wrong assumption. If the plan is sound, say so.";

/// What one reasoning pass needs to know about the turn.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningInput<'a> {
    pub session_id: Uuid,
    pub user_id: Option<&'a str>,
    pub server_id: Option<&'a str>,
    pub message: &'a str,
    pub history: &'a [ConversationMessage],
    pub memory_context: Option<&'a str>,
}

/// The reasoning loop and the collaborators its actions use.
pub struct ReasoningLoop<C: Completer> {
    completer: Arc<C>,
    memory: Option<Arc<ScopedMemoryStore>>,
    search: Option<Arc<BoxWebSearch>>,
    config: ReasoningConfig,
}

impl<C: Completer> ReasoningLoop<C> {
    pub fn new(completer: Arc<C>, config: ReasoningConfig) -> Self {
        Self {
            completer,
            memory: None,
            search: None,
            config,
        }
    }

    pub fn with_memory(mut self, memory: Arc<ScopedMemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_search(mut self, search: Arc<BoxWebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }

    /// Run the loop for one turn. Always returns a trace with a final action.
    #[tracing::instrument(
        name = "reasoning_loop",
        skip_all,
        fields(
            gen_ai.operation.name = "reason",
            session_id = %input.session_id,
            max_iterations = self.config.max_iterations,
        )
    )]
    pub async fn run(&self, input: &ReasoningInput<'_>) -> ReasoningTrace {
        let mut trace = ReasoningTrace::default();
        let mut gathered: Vec<String> = input.memory_context.map(str::to_string).into_iter().collect();

        for iteration in 1..=self.config.max_iterations {
            let thought = match self.think(input, &trace, &gathered).await {
                Some(thought) => thought,
                None => break,
            };
            tracing::debug!(
                iteration,
                action = %thought.action,
                confidence = thought.confidence,
                "Reasoning step"
            );
            trace.final_confidence = thought.confidence;
            trace.thoughts.push(thought.clone());

            if thought.action == ReasoningAction::Respond {
                if thought.confidence >= self.config.confidence_threshold {
                    trace.final_action = Some(ReasoningAction::Respond);
                    return trace;
                }
                continue;
            }

            self.act(&thought, input, &mut trace, &mut gathered).await;
        }

        if trace.thoughts.is_empty() {
            trace.final_confidence = FALLBACK_CONFIDENCE;
        }
        trace.final_action = Some(ReasoningAction::Respond);
        tracing::debug!(
            iterations = trace.iterations(),
            final_confidence = trace.final_confidence,
            "Reasoning finished without a confident respond"
        );
        trace
    }

    /// One model decision. `None` when the provider call failed.
    async fn think(
        &self,
        input: &ReasoningInput<'_>,
        trace: &ReasoningTrace,
        gathered: &[String],
    ) -> Option<Thought> {
        let messages = vec![
            Message::system(THOUGHT_SYSTEM_PROMPT),
            Message::user(self.thought_prompt(input, trace, gathered)),
        ];
        let options = CompletionOptions::side_call(self.config.thought_max_tokens);

        match self.completer.complete(&messages, &options).await {
            Ok(result) => Some(parse_thought(&result.content).unwrap_or_else(|fallback| {
                tracing::debug!(reason = %fallback.reason, "Unstructured reasoning step, treating as respond");
                fallback.into_thought()
            })),
            Err(e) => {
                tracing::warn!(error = %e, "Reasoning step failed, responding without further reasoning");
                None
            }
        }
    }

    fn thought_prompt(
        &self,
        input: &ReasoningInput<'_>,
        trace: &ReasoningTrace,
        gathered: &[String],
    ) -> String {
        let mut prompt = String::new();

        let window_start = input.history.len().saturating_sub(self.config.history_window);
        let recent = &input.history[window_start..];
        if !recent.is_empty() {
            prompt.push_str("<recent_conversation>\n");
            for m in recent {
                prompt.push_str(&format!("{}: {}\n", m.role, m.content));
            }
            prompt.push_str("</recent_conversation>\n\n");
        }

        if !gathered.is_empty() {
            prompt.push_str(&format!("<memory>\n{}\n</memory>\n\n", gathered.join("\n\n")));
        }

        if !trace.thoughts.is_empty() {
            prompt.push_str("<previous_steps>\n");
            for (i, t) in trace.thoughts.iter().enumerate() {
                prompt.push_str(&format!(
                    "{}. {} (confidence {:.2}): {}\n",
                    i + 1,
                    t.action,
                    t.confidence,
                    t.analysis
                ));
            }
            for obs in &trace.observations {
                prompt.push_str(&format!("Observation: {obs}\n"));
            }
            prompt.push_str("</previous_steps>\n\n");
        }

        prompt.push_str(&format!("<message>\n{}\n</message>", input.message));
        prompt
    }

    async fn act(
        &self,
        thought: &Thought,
        input: &ReasoningInput<'_>,
        trace: &mut ReasoningTrace,
        gathered: &mut Vec<String>,
    ) {
        let target = thought.action_target.as_deref().unwrap_or(input.message);

        match thought.action {
            ReasoningAction::Respond => {}
            ReasoningAction::RecallMemory => {
                let observation = self.recall(input, target, gathered).await;
                trace.observations.push(observation);
            }
            ReasoningAction::StoreMemory => {
                let observation = self.store(input, thought.action_target.as_deref()).await;
                trace.observations.push(observation);
            }
            ReasoningAction::AnalyzeContext => {
                trace
                    .observations
                    .push(analyze_context(input.history, input.message));
            }
            ReasoningAction::ConsiderTone => {
                trace.suggested_tone = Some(infer_tone(input.message));
            }
            ReasoningAction::Reflect => {
                if let Some(observation) = self.reflect(trace).await {
                    trace.observations.push(observation);
                }
            }
            ReasoningAction::Clarify => {
                trace.clarification_topic = Some(target.to_string());
            }
            ReasoningAction::WebSearch => {
                let observation = self.web_search(target).await;
                trace.observations.push(observation);
            }
        }
    }

    async fn recall(&self, input: &ReasoningInput<'_>, query: &str, gathered: &mut Vec<String>) -> String {
        let Some(memory) = &self.memory else {
            return "Memory is unavailable.".to_string();
        };
        match memory
            .query_combined(input.session_id, input.user_id, input.server_id, query)
            .await
        {
            Some(block) => {
                gathered.push(block.clone());
                format!("Recalled memories for \"{query}\":\n{block}")
            }
            None => format!("No stored memories matched \"{query}\"."),
        }
    }

    async fn store(&self, input: &ReasoningInput<'_>, content: Option<&str>) -> String {
        let Some(memory) = &self.memory else {
            return "Memory is unavailable; nothing was stored.".to_string();
        };
        let Some(content) = content else {
            return "No content was given to remember.".to_string();
        };

        let memory_type = classify_memory_type(content);
        let scope = scope_for(MemoryScope::User, input.user_id, input.server_id);
        let new = NewMemory::new(input.session_id, content, memory_type, scope)
            .with_user(input.user_id.map(str::to_string))
            .with_server(input.server_id.map(str::to_string))
            .with_importance(EXPLICIT_IMPORTANCE);

        match memory.create(new).await {
            Ok(record) => format!("Stored a {} memory: {}", record.memory_type, record.content),
            Err(e) => {
                tracing::warn!(error = %e, "Explicit memory store failed");
                format!("Could not store the memory ({e}).")
            }
        }
    }

    async fn reflect(&self, trace: &ReasoningTrace) -> Option<String> {
        if !self.config.self_reflection || trace.thoughts.len() < 2 {
            tracing::debug!("Reflection skipped");
            return None;
        }

        let steps = trace
            .thoughts
            .iter()
            .map(|t| format!("- {} ({:.2}): {}", t.action, t.confidence, t.analysis))
            .chain(trace.observations.iter().map(|o| format!("- observation: {o}")))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = vec![
            Message::system(REFLECTION_SYSTEM_PROMPT),
            Message::user(steps),
        ];

        match self
            .completer
            .complete(&messages, &CompletionOptions::side_call(REFLECTION_MAX_TOKENS))
            .await
        {
            Ok(result) => Some(format!("Self-check: {}", result.content.trim())),
            Err(e) => {
                tracing::warn!(error = %e, "Reflection call failed");
                None
            }
        }
    }

    async fn web_search(&self, query: &str) -> String {
        let Some(search) = &self.search else {
            return format!("Web search is unavailable; could not look up \"{query}\".");
        };
        match search.search(query, WEB_RESULTS).await {
            Ok(results) if results.is_empty() => {
                format!("Web search for \"{query}\" returned no results.")
            }
            Ok(results) => {
                let lines = results
                    .iter()
                    .map(|r| format!("- {}: {} ({})", r.title, r.snippet, r.url))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("Web results for \"{query}\":\n{lines}")
            }
            Err(e) => {
                tracing::warn!(provider = search.name(), error = %e, "Web search failed");
                format!("Web search for \"{query}\" failed.")
            }
        }
    }
}
