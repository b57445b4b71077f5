//! Applying compaction and refresh to persisted sessions.
//!
//! Both the chat orchestrator (before a turn) and the background scheduler
//! go through [`SessionMaintainer`], so a session is kept within budget the
//! same way whichever notices first. A conversation is maintained by one
//! claimant at a time; the claim is separate from the concurrency gate, so
//! background maintenance never turns a user message away.
//!
//! The new summary and the exclusion of the folded turns are committed in one
//! repository call. The caller's `Session` only changes once that succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;

use confidant_types::chat::{ConversationId, ConversationMessage, Session};
use confidant_types::error::CompactionError;

use super::compactor::HistoryCompactor;
use super::history::HistoryCache;
use super::repository::SessionRepository;
use crate::llm::completer::Completer;
use crate::memory::extractor::{ExtractionTarget, MemoryExtractor};

/// What a maintenance pass did to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maintenance {
    Untouched,
    /// Stale session: every in-context turn folded into the summary.
    Refreshed { removed: usize },
    /// Oversized session: the oldest turns folded into the summary.
    Compacted { removed: usize },
}

/// Exclusive right to maintain one conversation; released on drop.
pub struct MaintenanceClaim {
    _guard: OwnedMutexGuard<()>,
}

/// Keeps sessions fresh and within the token budget.
pub struct SessionMaintainer<R: SessionRepository, C: Completer> {
    repo: Arc<R>,
    compactor: HistoryCompactor<C>,
    history: Arc<HistoryCache>,
    extractor: Option<Arc<MemoryExtractor<C>>>,
    stale_after: chrono::Duration,
    claims: DashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>,
}

impl<R: SessionRepository, C: Completer + 'static> SessionMaintainer<R, C> {
    pub fn new(
        repo: Arc<R>,
        compactor: HistoryCompactor<C>,
        history: Arc<HistoryCache>,
        stale_after: chrono::Duration,
    ) -> Self {
        Self {
            repo,
            compactor,
            history,
            extractor: None,
            stale_after,
            claims: DashMap::new(),
        }
    }

    /// Extract memories from turns before they leave the context.
    pub fn with_extractor(mut self, extractor: Arc<MemoryExtractor<C>>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn compactor(&self) -> &HistoryCompactor<C> {
        &self.compactor
    }

    /// Claim `conversation_id` for maintenance without waiting.
    ///
    /// `None` means another turn or scheduler pass is maintaining it.
    pub fn try_claim(&self, conversation_id: &ConversationId) -> Option<MaintenanceClaim> {
        let lock = self
            .claims
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.try_lock_owned()
            .ok()
            .map(|guard| MaintenanceClaim { _guard: guard })
    }

    /// Drop unclaimed claim slots and cached history for conversations the
    /// gate has evicted as idle.
    pub fn release_idle(&self, conversation_ids: &[ConversationId]) {
        for id in conversation_ids {
            self.claims
                .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
            self.history.evict(id);
        }
    }

    pub fn tracked_claims(&self) -> usize {
        self.claims.len()
    }

    pub fn is_stale(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_activity_at > self.stale_after
    }

    pub fn needs_compaction(&self, session: &Session) -> bool {
        session
            .last_usage
            .as_ref()
            .is_some_and(|usage| self.compactor.should_compact(usage))
    }

    /// Refresh a stale session or compact an oversized one.
    ///
    /// The caller holds the conversation's [`MaintenanceClaim`]. Failures are
    /// returned to the caller, who logs them; the session is left as it was
    /// and the check runs again next time.
    pub async fn maintain(
        &self,
        session: &mut Session,
        target: Option<ExtractionTarget>,
    ) -> Result<Maintenance, CompactionError> {
        if self.is_stale(session, Utc::now()) {
            let removed = self.refresh(session, target.clone()).await?;
            if removed > 0 {
                return Ok(Maintenance::Refreshed { removed });
            }
        }
        if self.needs_compaction(session) {
            let target = target_or_session(target, session);
            let removed = self.compact(session, target).await?;
            return Ok(Maintenance::Compacted { removed });
        }
        Ok(Maintenance::Untouched)
    }

    /// Fold the oldest turns into the running summary.
    #[tracing::instrument(name = "compact_session", skip_all, fields(session_id = %session.id))]
    pub async fn compact(
        &self,
        session: &mut Session,
        target: ExtractionTarget,
    ) -> Result<usize, CompactionError> {
        let messages = self.repo.get_context_messages(&session.id).await?;
        let outcome = self.compactor.compact(&messages, &session.context).await?;

        // An empty plan still commits: the stale usage must stop re-triggering.
        self.commit(
            session,
            outcome.summary,
            outcome.summary_tokens,
            &messages[..outcome.removed_count],
            target,
        )
        .await?;
        Ok(outcome.removed_count)
    }

    /// Fold every in-context turn of a stale session into its summary.
    #[tracing::instrument(name = "refresh_session", skip_all, fields(session_id = %session.id))]
    pub async fn refresh(
        &self,
        session: &mut Session,
        target: Option<ExtractionTarget>,
    ) -> Result<usize, CompactionError> {
        let messages = self.repo.get_context_messages(&session.id).await?;
        if messages.is_empty() {
            return Ok(0);
        }

        let summary = self.compactor.fold(&messages, &session.context).await?;
        let summary_tokens = self.compactor.tokens().estimate(&summary);
        let target = target_or_session(target, session);
        self.commit(session, summary, summary_tokens, &messages, target)
            .await?;
        tracing::info!(removed = messages.len(), "Stale session refreshed");
        Ok(messages.len())
    }

    async fn commit(
        &self,
        session: &mut Session,
        summary: String,
        summary_tokens: u32,
        removed: &[ConversationMessage],
        target: ExtractionTarget,
    ) -> Result<(), CompactionError> {
        let ids: Vec<_> = removed.iter().map(|m| m.id).collect();
        self.repo
            .commit_compaction(&session.id, &summary, summary_tokens, &ids)
            .await?;

        session.context = summary;
        session.context_tokens = summary_tokens;
        session.last_usage = None;
        if removed.is_empty() {
            return Ok(());
        }

        self.history.evict(&session.conversation_id);
        if let Some(extractor) = &self.extractor {
            extractor.spawn(removed.to_vec(), target);
        }
        Ok(())
    }
}

fn target_or_session(target: Option<ExtractionTarget>, session: &Session) -> ExtractionTarget {
    target.unwrap_or_else(|| ExtractionTarget {
        session_id: session.id,
        user_id: None,
        server_id: None,
    })
}

#[cfg(test)]
mod tests {
    use confidant_types::chat::ConversationId;
    use confidant_types::config::CompactionConfig;
    use confidant_types::llm::{MessageRole, Usage};

    use super::*;
    use crate::llm::tokens::TokenEstimator;
    use crate::test_support::{InMemorySessionRepository, ScriptedCompleter};

    fn maintainer(
        repo: InMemorySessionRepository,
        completer: ScriptedCompleter,
        history: Arc<HistoryCache>,
    ) -> SessionMaintainer<InMemorySessionRepository, ScriptedCompleter> {
        SessionMaintainer::new(
            Arc::new(repo),
            HistoryCompactor::new(
                Arc::new(completer),
                TokenEstimator::heuristic(),
                &CompactionConfig {
                    max_context_tokens: 500,
                },
            ),
            history,
            chrono::Duration::minutes(60),
        )
    }

    fn seeded(repo: &InMemorySessionRepository, turns: usize) -> Session {
        let mut session = Session::new(ConversationId::from("c1"));
        session.last_usage = Some(Usage::new(900, 100, None));
        repo.insert_session(session.clone());
        for i in 0..turns {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            repo.insert_message(ConversationMessage::new(session.id, role, "x".repeat(175)));
        }
        session
    }

    #[tokio::test]
    async fn test_compaction_commits_summary_and_exclusions() {
        let repo = InMemorySessionRepository::default();
        let history = Arc::new(HistoryCache::new());
        let mut session = seeded(&repo, 20);
        history.set(&session.conversation_id, Vec::new());
        let maintainer = maintainer(repo.clone(), ScriptedCompleter::new(["Summary A."]), history.clone());

        let done = maintainer.maintain(&mut session, None).await.unwrap();

        assert_eq!(done, Maintenance::Compacted { removed: 16 });
        let stored = repo.session(session.id).unwrap();
        assert_eq!(stored.context, "Summary A.");
        assert!(stored.context_tokens > 0);
        assert!(stored.last_usage.is_none());
        let in_context = repo.all_messages().iter().filter(|m| m.include_in_context).count();
        assert_eq!(in_context, 4);
        assert!(history.get(&session.conversation_id).is_none());
    }

    #[tokio::test]
    async fn test_failed_compaction_leaves_history() {
        let repo = InMemorySessionRepository::default();
        let mut session = seeded(&repo, 20);
        let completer = ScriptedCompleter::default();
        completer.push_error("down");
        let maintainer = maintainer(repo.clone(), completer, Arc::new(HistoryCache::new()));

        assert!(maintainer.maintain(&mut session, None).await.is_err());
        assert!(repo.all_messages().iter().all(|m| m.include_in_context));
        assert!(repo.session(session.id).unwrap().context.is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_session_and_history() {
        let repo = InMemorySessionRepository::default();
        let history = Arc::new(HistoryCache::new());
        let mut session = seeded(&repo, 20);
        history.set(&session.conversation_id, Vec::new());
        repo.set_failing_commits(true);
        let first = maintainer(repo.clone(), ScriptedCompleter::new(["Summary A."]), history.clone());

        assert!(first.maintain(&mut session, None).await.is_err());

        assert!(session.context.is_empty());
        assert_eq!(session.context_tokens, 0);
        assert!(session.last_usage.is_some());
        assert!(repo.session(session.id).unwrap().context.is_empty());
        assert!(repo.all_messages().iter().all(|m| m.include_in_context));
        assert!(history.get(&session.conversation_id).is_some());

        // The next attempt compacts normally.
        repo.set_failing_commits(false);
        let second = maintainer(repo.clone(), ScriptedCompleter::new(["Summary B."]), history);
        assert_eq!(
            second.maintain(&mut session, None).await.unwrap(),
            Maintenance::Compacted { removed: 16 }
        );
        assert_eq!(session.context, "Summary B.");
    }

    #[test]
    fn test_claim_is_exclusive_and_released_on_drop() {
        let maintainer = maintainer(
            InMemorySessionRepository::default(),
            ScriptedCompleter::default(),
            Arc::new(HistoryCache::new()),
        );
        let id = ConversationId::from("c1");

        let claim = maintainer.try_claim(&id).unwrap();
        assert!(maintainer.try_claim(&id).is_none());
        assert!(maintainer.try_claim(&ConversationId::from("c2")).is_some());

        // A held claim survives idle release.
        maintainer.release_idle(std::slice::from_ref(&id));
        assert!(maintainer.try_claim(&id).is_none());

        drop(claim);
        assert!(maintainer.try_claim(&id).is_some());
    }

    #[test]
    fn test_release_idle_drops_claims_and_history() {
        let history = Arc::new(HistoryCache::new());
        let maintainer = maintainer(
            InMemorySessionRepository::default(),
            ScriptedCompleter::default(),
            history.clone(),
        );
        let idle = ConversationId::from("idle");
        let active = ConversationId::from("active");
        drop(maintainer.try_claim(&idle));
        let _held = maintainer.try_claim(&active).unwrap();
        history.set(&idle, Vec::new());
        history.set(&active, Vec::new());

        maintainer.release_idle(&[idle.clone()]);

        assert_eq!(maintainer.tracked_claims(), 1);
        assert!(history.get(&idle).is_none());
        assert!(history.get(&active).is_some());
    }

    #[tokio::test]
    async fn test_stale_session_is_refreshed() {
        let repo = InMemorySessionRepository::default();
        let mut session = seeded(&repo, 4);
        session.last_usage = None;
        session.last_activity_at = Utc::now() - chrono::Duration::hours(3);
        let maintainer = maintainer(repo.clone(), ScriptedCompleter::new(["Earlier chat."]), Arc::new(HistoryCache::new()));

        let done = maintainer.maintain(&mut session, None).await.unwrap();

        assert_eq!(done, Maintenance::Refreshed { removed: 4 });
        assert!(repo.all_messages().iter().all(|m| !m.include_in_context));
        assert_eq!(repo.session(session.id).unwrap().context, "Earlier chat.");
    }

    #[tokio::test]
    async fn test_fresh_small_session_is_untouched() {
        let repo = InMemorySessionRepository::default();
        let mut session = seeded(&repo, 4);
        session.last_usage = Some(Usage::new(100, 20, None));
        let completer = ScriptedCompleter::default();
        let maintainer = maintainer(repo, completer.clone(), Arc::new(HistoryCache::new()));

        assert_eq!(maintainer.maintain(&mut session, None).await.unwrap(), Maintenance::Untouched);
        assert_eq!(completer.calls(), 0);
    }
}
