//! In-memory collaborators shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use confidant_types::chat::{ConversationId, ConversationMessage, Session};
use confidant_types::error::{EmbeddingError, RepositoryError};
use confidant_types::llm::{CompletionOptions, CompletionResult, LlmError, Message, Usage};
use confidant_types::memory::{MemoryFilter, MemoryMatch, MemoryRecord};

use crate::chat::repository::SessionRepository;
use crate::llm::completer::Completer;
use crate::memory::embedder::Embedder;
use crate::memory::vector::VectorMemoryStore;

const DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder: identical text gives identical vectors.
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; DIMENSION];
        for word in text.to_lowercase().split_whitespace() {
            let bucket = word
                .bytes()
                .fold(7u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)));
            vector[(bucket % DIMENSION as u64) as usize] += 1.0;
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "hash-test"
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Request("connection refused".to_string()))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Vector store backed by a shared `Vec`.
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    records: Arc<Mutex<Vec<MemoryRecord>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryVectorStore {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn records(&self) -> Vec<MemoryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RepositoryError::Connection)
        } else {
            Ok(())
        }
    }
}

impl VectorMemoryStore for InMemoryVectorStore {
    async fn upsert(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.id != record.id);
        records.push(record.clone());
        Ok(())
    }

    async fn query_similar(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryMatch>, RepositoryError> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let mut matches: Vec<MemoryMatch> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| MemoryMatch {
                record: r.clone(),
                similarity: cosine(vector, &r.embedding),
            })
            .filter(|m| m.similarity >= min_score)
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn list(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let mut listed: Vec<MemoryRecord> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        listed.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        listed.truncate(limit);
        Ok(listed)
    }

    async fn delete_where(&self, filter: &MemoryFilter) -> Result<u64, RepositoryError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        Ok((before - records.len()) as u64)
    }
}

/// Completer that replays scripted replies and records every call.
#[derive(Clone, Default)]
pub struct ScriptedCompleter {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<(Vec<Message>, CompletionOptions)>>>,
    preferred: Arc<Mutex<Vec<Option<String>>>>,
    delay: Option<Duration>,
    fallback_reply: Option<String>,
}

impl ScriptedCompleter {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(
                replies.into_iter().map(|r| Ok(r.into())).collect(),
            )),
            ..Default::default()
        }
    }

    /// Reply with `reply` once the script runs out.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = Some(reply.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(Vec<Message>, CompletionOptions)> {
        self.seen.lock().unwrap().clone()
    }

    /// Preferred providers passed to routed calls, in order.
    pub fn preferred(&self) -> Vec<Option<String>> {
        self.preferred.lock().unwrap().clone()
    }
}

impl Completer for ScriptedCompleter {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<CompletionResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((messages.to_vec(), options.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => reply,
            None => self
                .fallback_reply
                .clone()
                .ok_or_else(|| "script exhausted".to_string()),
        };

        match reply {
            Ok(content) => Ok(CompletionResult {
                content,
                provider: "scripted".to_string(),
                model: "scripted-model".to_string(),
                usage: Usage::new(100, 20, Some(40)),
                fallback_count: 0,
            }),
            Err(message) => Err(LlmError::AllProvidersExhausted {
                last_provider: "scripted".to_string(),
                message,
                attempted: vec!["scripted".to_string()],
            }),
        }
    }

    async fn complete_preferring(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        preferred: Option<&str>,
    ) -> Result<CompletionResult, LlmError> {
        self.preferred
            .lock()
            .unwrap()
            .push(preferred.map(str::to_string));
        self.complete(messages, options).await
    }
}

/// Session repository over in-process maps.
#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<Mutex<Vec<Session>>>,
    messages: Arc<Mutex<Vec<ConversationMessage>>>,
    personas: Arc<Mutex<Vec<(String, String)>>>,
    failing_commits: Arc<AtomicBool>,
}

impl InMemorySessionRepository {
    pub fn all_messages(&self) -> Vec<ConversationMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn insert_session(&self, session: Session) {
        self.sessions.lock().unwrap().push(session);
    }

    pub fn insert_message(&self, message: ConversationMessage) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn set_persona(&self, server_id: &str, persona: &str) {
        self.personas
            .lock()
            .unwrap()
            .push((server_id.to_string(), persona.to_string()));
    }

    /// Make every `commit_compaction` fail without changing anything.
    pub fn set_failing_commits(&self, failing: bool) {
        self.failing_commits.store(failing, Ordering::SeqCst);
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }
}

impl SessionRepository for InMemorySessionRepository {
    async fn get_session_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Session>, RepositoryError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.conversation_id == conversation_id)
            .cloned())
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        Ok(self.session(*id))
    }

    async fn create_session(&self, session: &Session) -> Result<(), RepositoryError> {
        self.insert_session(session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let slot = sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = session.clone();
        Ok(())
    }

    async fn list_sessions_active_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.last_activity_at >= since)
            .cloned()
            .collect())
    }

    async fn append_exchange(
        &self,
        messages: &[ConversationMessage],
    ) -> Result<(), RepositoryError> {
        self.messages.lock().unwrap().extend_from_slice(messages);
        Ok(())
    }

    async fn get_context_messages(
        &self,
        session_id: &Uuid,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.session_id == session_id && m.include_in_context)
            .cloned()
            .collect())
    }

    async fn record_activity(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
        usage: Option<&Usage>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let slot = sessions
            .iter_mut()
            .find(|s| &s.id == session_id)
            .ok_or(RepositoryError::NotFound)?;
        slot.last_activity_at = at;
        slot.last_usage = usage.cloned();
        Ok(())
    }

    async fn commit_compaction(
        &self,
        session_id: &Uuid,
        summary: &str,
        summary_tokens: u32,
        removed: &[Uuid],
    ) -> Result<u64, RepositoryError> {
        if self.failing_commits.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        let mut sessions = self.sessions.lock().unwrap();
        let slot = sessions
            .iter_mut()
            .find(|s| &s.id == session_id)
            .ok_or(RepositoryError::NotFound)?;
        slot.context = summary.to_string();
        slot.context_tokens = summary_tokens;
        slot.last_usage = None;

        let mut messages = self.messages.lock().unwrap();
        let mut count = 0;
        for message in messages.iter_mut() {
            if message.include_in_context && removed.contains(&message.id) {
                message.include_in_context = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_server_persona(&self, server_id: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .personas
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == server_id)
            .map(|(_, persona)| persona.clone()))
    }
}
