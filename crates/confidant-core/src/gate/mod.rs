//! Per-conversation concurrency gate.
//!
//! One exclusive lock per conversation id, created lazily in a sharded map.
//! Acquisition never waits: a second request for a conversation that is
//! already generating is rejected immediately, as a duplicate while the
//! holder is inside the duplicate window and as busy afterwards.
//!
//! The returned [`GateHandle`] releases the lock when dropped, so release
//! happens on every exit path. Released locks that stay idle are evicted by
//! [`ConversationGate::sweep_idle`], driven by the background sweeper.

pub mod sweeper;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;

use confidant_types::chat::ConversationId;
use confidant_types::config::GateConfig;

/// Why a request was not admitted. Both are silent no-ops for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateRejection {
    /// Another request for the same conversation was admitted within the duplicate window.
    #[error("duplicate request within the duplicate window")]
    Duplicate,
    /// The conversation is generating and the duplicate window has passed.
    #[error("conversation busy")]
    Busy,
}

struct LockSlot {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Admission time of the current holder; `None` when released.
    pending_since: Mutex<Option<Instant>>,
    last_released: Mutex<Instant>,
}

impl LockSlot {
    fn new() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            pending_since: Mutex::new(None),
            last_released: Mutex::new(Instant::now()),
        }
    }

    fn pending_since(&self) -> Option<Instant> {
        *self.pending_since.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_pending(&self, at: Option<Instant>) {
        *self.pending_since.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    fn idle_for(&self) -> Duration {
        self.last_released
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    fn mark_released(&self) {
        *self.last_released.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }
}

#[derive(Default)]
struct GateCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of gate activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    /// Conversations with a lock entry in the registry.
    pub tracked: usize,
    pub acquired: u64,
    pub released: u64,
    pub rejected: u64,
}

/// Proof of admission for one conversation. Dropping it releases the lock.
#[must_use = "dropping the handle releases the conversation immediately"]
pub struct GateHandle {
    conversation_id: ConversationId,
    slot: Arc<LockSlot>,
    counters: Arc<GateCounters>,
    _guard: OwnedMutexGuard<()>,
}

impl GateHandle {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.slot.set_pending(None);
        self.slot.mark_released();
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(conversation_id = %self.conversation_id, "Gate released");
    }
}

impl std::fmt::Debug for GateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateHandle")
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

/// Registry of per-conversation locks.
pub struct ConversationGate {
    slots: DashMap<ConversationId, Arc<LockSlot>>,
    counters: Arc<GateCounters>,
    duplicate_window: Duration,
    idle_eviction: Duration,
}

impl ConversationGate {
    pub fn new(duplicate_window: Duration, idle_eviction: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            counters: Arc::new(GateCounters::default()),
            duplicate_window,
            idle_eviction,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            Duration::from_secs(config.duplicate_window_secs),
            Duration::from_secs(config.lock_idle_secs),
        )
    }

    /// Try to admit a request for `conversation_id` without waiting.
    pub fn try_enter(&self, conversation_id: &ConversationId) -> Result<GateHandle, GateRejection> {
        // The shard guard is dropped at the end of this statement.
        let slot = self
            .slots
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(LockSlot::new()))
            .clone();

        match slot.lock.clone().try_lock_owned() {
            Ok(guard) => {
                slot.set_pending(Some(Instant::now()));
                self.counters.acquired.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(conversation_id = %conversation_id, "Gate acquired");
                Ok(GateHandle {
                    conversation_id: conversation_id.clone(),
                    slot,
                    counters: Arc::clone(&self.counters),
                    _guard: guard,
                })
            }
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                let within_window = slot
                    .pending_since()
                    .is_some_and(|since| since.elapsed() < self.duplicate_window);
                if within_window {
                    tracing::debug!(conversation_id = %conversation_id, "Duplicate request suppressed");
                    Err(GateRejection::Duplicate)
                } else {
                    tracing::debug!(conversation_id = %conversation_id, "Conversation busy, request dropped");
                    Err(GateRejection::Busy)
                }
            }
        }
    }

    /// Whether a request for `conversation_id` is currently admitted.
    pub fn is_held(&self, conversation_id: &ConversationId) -> bool {
        self.slots
            .get(conversation_id)
            .is_some_and(|slot| slot.lock.try_lock().is_err())
    }

    /// Evict locks that are released and idle longer than the eviction window.
    /// Returns the evicted conversation ids.
    ///
    /// A slot referenced by a live handle is never removed: `retain` holds the
    /// shard lock, so no new handle can appear while the slot is inspected.
    pub fn sweep_idle(&self) -> Vec<ConversationId> {
        let mut removed = Vec::new();
        self.slots.retain(|id, slot| {
            let in_use = Arc::strong_count(slot) > 1 || slot.lock.try_lock().is_err();
            let keep = in_use || slot.idle_for() < self.idle_eviction;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        removed
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            tracked: self.slots.len(),
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
            rejected: self.counters.rejected.load(Ordering::SeqCst),
        }
    }
}

impl Default for ConversationGate {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}
