//! Background task that evicts idle conversation locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use confidant_types::chat::ConversationId;

use super::ConversationGate;

/// Spawn a task that calls [`ConversationGate::sweep_idle`] every `interval`
/// until `cancel` fires.
///
/// `on_evict` receives the conversations evicted by each sweep so other
/// per-conversation state (history cache, maintenance claims) goes with them.
pub fn spawn_idle_sweeper<F>(
    gate: Arc<ConversationGate>,
    interval: Duration,
    cancel: CancellationToken,
    on_evict: F,
) -> JoinHandle<()>
where
    F: Fn(&[ConversationId]) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Gate sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = gate.sweep_idle();
                    if !evicted.is_empty() {
                        on_evict(&evicted);
                        tracing::debug!(
                            removed = evicted.len(),
                            tracked = gate.stats().tracked,
                            "Evicted idle conversation locks"
                        );
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::chat::history::HistoryCache;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_and_keeps_held() {
        let gate = Arc::new(ConversationGate::new(
            Duration::from_secs(5),
            Duration::ZERO,
        ));
        let held = gate.try_enter(&ConversationId::from("held")).unwrap();
        drop(gate.try_enter(&ConversationId::from("idle")).unwrap());
        assert_eq!(gate.stats().tracked, 2);

        let history = Arc::new(HistoryCache::new());
        history.set(&ConversationId::from("held"), Vec::new());
        history.set(&ConversationId::from("idle"), Vec::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let cancel = CancellationToken::new();
        let task = spawn_idle_sweeper(Arc::clone(&gate), Duration::from_secs(60), cancel.clone(), {
            let history = Arc::clone(&history);
            let seen = Arc::clone(&seen);
            move |evicted: &[ConversationId]| {
                for id in evicted {
                    history.evict(id);
                }
                seen.lock().unwrap().extend_from_slice(evicted);
            }
        });

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(gate.stats().tracked, 1);
        assert!(gate.is_held(held.conversation_id()));
        assert_eq!(*seen.lock().unwrap(), vec![ConversationId::from("idle")]);
        assert_eq!(history.len(), 1);
        assert!(history.get(&ConversationId::from("held")).is_some());

        cancel.cancel();
        task.await.unwrap();
    }
}
