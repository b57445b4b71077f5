//! Chat orchestrator: one inbound message in, one reply (or nothing) out.
//!
//! Order of a turn:
//! 1. admit through the concurrency gate, or drop silently
//! 2. load or create the session; refresh or compact it if due, unless the
//!    scheduler is already maintaining it
//! 3. read short-term history and long-term memory
//! 4. optionally run the reasoning loop
//! 5. assemble the cache-ordered prompt and generate through the providers
//! 6. persist the exchange, update the cache, extract memories in the background
//!
//! Only repository failures are errors. Memory, reasoning, compaction, and
//! extraction problems are logged and the turn continues. Provider exhaustion
//! produces an apology reply that is not persisted.

use std::sync::Arc;

use chrono::Utc;

use confidant_types::chat::{
    ConversationId, ConversationMessage, IncomingMessage, Reply, Session, TurnOutcome,
};
use confidant_types::config::PersonaConfig;
use confidant_types::error::ChatError;
use confidant_types::llm::{CompletionOptions, MessageRole};

use super::history::HistoryCache;
use super::maintenance::SessionMaintainer;
use super::repository::SessionRepository;
use crate::gate::ConversationGate;
use crate::llm::completer::Completer;
use crate::llm::prompt::PromptAssembler;
use crate::memory::extractor::{ExtractionTarget, MemoryExtractor};
use crate::memory::store::ScopedMemoryStore;
use crate::reasoning::engine::{ReasoningInput, ReasoningLoop};

/// Sent when every provider failed.
pub const APOLOGY: &str =
    "Sorry, I'm having trouble thinking right now. Please try again in a moment.";

pub struct ChatService<R: SessionRepository, C: Completer> {
    repo: Arc<R>,
    completer: Arc<C>,
    gate: Arc<ConversationGate>,
    history: Arc<HistoryCache>,
    maintainer: Arc<SessionMaintainer<R, C>>,
    persona: PersonaConfig,
    memory: Option<Arc<ScopedMemoryStore>>,
    reasoning: Option<ReasoningLoop<C>>,
    extractor: Option<Arc<MemoryExtractor<C>>>,
}

impl<R, C> ChatService<R, C>
where
    R: SessionRepository + 'static,
    C: Completer + 'static,
{
    pub fn new(
        repo: Arc<R>,
        completer: Arc<C>,
        gate: Arc<ConversationGate>,
        history: Arc<HistoryCache>,
        maintainer: Arc<SessionMaintainer<R, C>>,
        persona: PersonaConfig,
    ) -> Self {
        Self {
            repo,
            completer,
            gate,
            history,
            maintainer,
            persona,
            memory: None,
            reasoning: None,
            extractor: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<ScopedMemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningLoop<C>) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<MemoryExtractor<C>>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn gate(&self) -> &Arc<ConversationGate> {
        &self.gate
    }

    /// Handle one inbound message.
    #[tracing::instrument(
        name = "handle_message",
        skip_all,
        fields(conversation_id = %incoming.conversation_id)
    )]
    pub async fn handle_message(&self, incoming: IncomingMessage) -> Result<TurnOutcome, ChatError> {
        let _admission = match self.gate.try_enter(&incoming.conversation_id) {
            Ok(handle) => handle,
            Err(rejection) => {
                tracing::debug!(reason = %rejection, "Message dropped by gate");
                return Ok(TurnOutcome::Suppressed);
            }
        };

        // Claimed before the session is read so the snapshot cannot predate a
        // scheduler commit. Held until the turn ends.
        let maintenance = self.maintainer.try_claim(&incoming.conversation_id);
        let mut session = self.load_or_create_session(&incoming.conversation_id).await?;
        let target = ExtractionTarget {
            session_id: session.id,
            user_id: incoming.author_id.clone(),
            server_id: incoming.server_id.clone(),
        };

        if maintenance.is_some() {
            if let Err(e) = self.maintainer.maintain(&mut session, Some(target.clone())).await {
                tracing::warn!(session_id = %session.id, error = %e, "Compaction failed, continuing with full history");
            }
        } else {
            tracing::debug!(session_id = %session.id, "Session is being maintained in the background, skipping");
        }

        let history = self.history(&session, maintenance.is_some()).await?;

        let memory_context = match &self.memory {
            Some(memory) => {
                memory
                    .query_combined(
                        session.id,
                        incoming.author_id.as_deref(),
                        incoming.server_id.as_deref(),
                        &incoming.content,
                    )
                    .await
            }
            None => None,
        };

        let enrichment = match &self.reasoning {
            Some(reasoning) if reasoning.config().enabled => {
                let trace = reasoning
                    .run(&ReasoningInput {
                        session_id: session.id,
                        user_id: incoming.author_id.as_deref(),
                        server_id: incoming.server_id.as_deref(),
                        message: &incoming.content,
                        history: &history,
                        memory_context: memory_context.as_deref(),
                    })
                    .await;
                trace.enriched_context()
            }
            _ => None,
        };

        let volatile = [memory_context, enrichment]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n");

        let persona = self.persona_for(incoming.server_id.as_deref()).await;
        let user_message = ConversationMessage::new(session.id, MessageRole::User, incoming.content.clone());
        let mut turns = history;
        turns.push(user_message.clone());
        let messages = PromptAssembler::build(&persona, &session.context, &turns, Some(&volatile));

        let (preferred, model) = match session.preference() {
            Some((provider, model)) => (Some(provider.to_string()), model.map(str::to_string)),
            None => (None, None),
        };
        let options = CompletionOptions {
            conversation_id: Some(incoming.conversation_id.to_string()),
            model,
            ..Default::default()
        };

        let result = match self
            .completer
            .complete_preferring(&messages, &options, preferred.as_deref())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "All providers failed, sending apology");
                return Ok(TurnOutcome::Reply(Reply {
                    content: APOLOGY.to_string(),
                    provider: None,
                    model: None,
                    usage: None,
                    fallback_count: 0,
                    degraded: true,
                }));
            }
        };

        let assistant_message =
            ConversationMessage::new(session.id, MessageRole::Assistant, result.content.clone());
        let exchange = vec![user_message, assistant_message];
        self.repo.append_exchange(&exchange).await?;

        self.repo
            .record_activity(&session.id, Utc::now(), Some(&result.usage))
            .await?;
        self.history.append(&incoming.conversation_id, &exchange);

        if let Some(extractor) = &self.extractor {
            extractor.spawn(exchange, target);
        }

        tracing::info!(
            provider = %result.provider,
            model = %result.model,
            fallback_count = result.fallback_count,
            total_tokens = result.usage.total_tokens,
            "Reply generated"
        );

        Ok(TurnOutcome::Reply(Reply {
            content: result.content,
            provider: Some(result.provider),
            model: Some(result.model),
            usage: Some(result.usage),
            fallback_count: result.fallback_count,
            degraded: false,
        }))
    }

    async fn load_or_create_session(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Session, ChatError> {
        if let Some(session) = self.repo.get_session_by_conversation(conversation_id).await? {
            return Ok(session);
        }
        let session = Session::new(conversation_id.clone());
        self.repo.create_session(&session).await?;
        tracing::info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// In-context turns. Without the maintenance claim the cache is bypassed:
    /// a background commit may be about to evict it.
    async fn history(
        &self,
        session: &Session,
        claimed: bool,
    ) -> Result<Vec<ConversationMessage>, ChatError> {
        if !claimed {
            return Ok(self.repo.get_context_messages(&session.id).await?);
        }
        if let Some(cached) = self.history.get(&session.conversation_id) {
            return Ok(cached);
        }
        let messages = self.repo.get_context_messages(&session.id).await?;
        self.history.set(&session.conversation_id, messages.clone());
        Ok(messages)
    }

    /// Forget per-conversation state for conversations evicted as idle.
    pub fn release_idle(&self, conversation_ids: &[ConversationId]) {
        self.maintainer.release_idle(conversation_ids);
    }

    async fn persona_for(&self, server_id: Option<&str>) -> String {
        let Some(server_id) = server_id else {
            return self.persona.system_prompt.clone();
        };
        match self.repo.get_server_persona(server_id).await {
            Ok(Some(persona)) if !persona.trim().is_empty() => persona,
            Ok(_) => self.persona.system_prompt.clone(),
            Err(e) => {
                tracing::warn!(server_id, error = %e, "Could not load server persona, using default");
                self.persona.system_prompt.clone()
            }
        }
    }
}
