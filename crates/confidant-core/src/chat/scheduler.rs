//! Periodic session refresh, compaction, and memory cleanup.
//!
//! Runs independently of user traffic. The scheduler never enters the
//! concurrency gate, so a user message arriving mid-cycle is always admitted.
//! A conversation that is generating, or already being maintained, is skipped
//! for the cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use confidant_types::config::SchedulerConfig;

use super::maintenance::{Maintenance, SessionMaintainer};
use super::repository::SessionRepository;
use crate::gate::ConversationGate;
use crate::llm::completer::Completer;
use crate::memory::store::ScopedMemoryStore;

/// Sessions idle longer than this are not revisited by the scheduler.
const ACTIVE_LOOKBACK_HOURS: i64 = 24;

const CLEANUP_EVERY: Duration = Duration::from_secs(24 * 60 * 60);

/// Counts from one scheduler cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub refreshed: usize,
    pub compacted: usize,
    pub busy: usize,
    pub failed: usize,
    pub memories_cleaned: Option<u64>,
}

pub struct SessionScheduler<R: SessionRepository, C: Completer> {
    repo: Arc<R>,
    maintainer: Arc<SessionMaintainer<R, C>>,
    gate: Arc<ConversationGate>,
    memory: Option<Arc<ScopedMemoryStore>>,
    config: SchedulerConfig,
    last_cleanup: tokio::sync::Mutex<Option<Instant>>,
}

impl<R, C> SessionScheduler<R, C>
where
    R: SessionRepository + 'static,
    C: Completer + 'static,
{
    pub fn new(
        repo: Arc<R>,
        maintainer: Arc<SessionMaintainer<R, C>>,
        gate: Arc<ConversationGate>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            maintainer,
            gate,
            memory: None,
            config,
            last_cleanup: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_memory_cleanup(mut self, memory: Arc<ScopedMemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// One pass over recently active sessions. Never fails; every problem
    /// is logged and counted.
    pub async fn run_once(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let sessions = match self
            .repo
            .list_sessions_active_since(Utc::now() - chrono::Duration::hours(ACTIVE_LOOKBACK_HOURS))
            .await
        {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(error = %e, "Scheduler could not list sessions");
                report.failed += 1;
                return report;
            }
        };

        for listed in sessions {
            report.checked += 1;
            if self.gate.is_held(&listed.conversation_id) {
                report.busy += 1;
                continue;
            }
            let Some(_claim) = self.maintainer.try_claim(&listed.conversation_id) else {
                report.busy += 1;
                continue;
            };

            // A turn may have compacted since the listing.
            let mut session = match self.repo.get_session(&listed.id).await {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(session_id = %listed.id, error = %e, "Scheduler could not reload session");
                    continue;
                }
            };

            match self.maintainer.maintain(&mut session, None).await {
                Ok(Maintenance::Refreshed { .. }) => report.refreshed += 1,
                Ok(Maintenance::Compacted { .. }) => report.compacted += 1,
                Ok(Maintenance::Untouched) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        session_id = %session.id,
                        conversation_id = %session.conversation_id,
                        error = %e,
                        "Scheduled session maintenance failed"
                    );
                }
            }
        }

        report.memories_cleaned = self.cleanup_if_due().await;

        if report.refreshed + report.compacted + report.failed > 0 {
            tracing::info!(
                checked = report.checked,
                refreshed = report.refreshed,
                compacted = report.compacted,
                busy = report.busy,
                failed = report.failed,
                "Scheduler cycle finished"
            );
        }
        report
    }

    async fn cleanup_if_due(&self) -> Option<u64> {
        let memory = self.memory.as_ref()?;
        let mut last = self.last_cleanup.lock().await;
        if last.is_some_and(|at| at.elapsed() < CLEANUP_EVERY) {
            return None;
        }
        *last = Some(Instant::now());

        match memory.cleanup_default().await {
            Ok(deleted) => Some(deleted),
            Err(e) => {
                tracing::warn!(error = %e, "Scheduled memory cleanup failed");
                None
            }
        }
    }

    /// Run [`Self::run_once`] every `interval_secs` until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Session scheduler stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
        })
    }
}
