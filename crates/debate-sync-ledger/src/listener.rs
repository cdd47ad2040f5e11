//! Event listener: drives [`SyncHandlers`] from a ledger subscription.
//!
//! ```text
//! Stopped --start--> Starting --subscribed--> Listening --stop--> Stopped
//!    ^                  |                         |
//!    +----- error ------+        stream closed ---+
//! ```
//!
//! One background task per running listener. Decode and handler failures
//! are logged and the event dropped; reconciliation repairs whatever the
//! listener missed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use debate_sync_core::{now_millis, Address, RawLedgerEvent};
use debate_sync_store::ProjectionStore;

use crate::error::Result;
use crate::handlers::{Disposition, SyncHandlers};
use crate::ledger::{EventFilter, Ledger, SubscriptionId};

/// Configuration for the event listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListenerConfig {
    /// Contracts to watch. Empty means every contract the ledger reports.
    pub contracts: Vec<Address>,
    /// Block to start from. `None` resumes from the stored cursor.
    pub start_block: Option<u64>,
    /// Name of the store cursor holding the last processed block.
    pub cursor_name: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            contracts: Vec::new(),
            start_block: None,
            cursor_name: "event-listener".to_string(),
        }
    }
}

/// Lifecycle of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Stopped,
    Starting,
    Listening,
}

/// Counters since the listener was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStats {
    pub received: u64,
    pub applied: u64,
    pub duplicate: u64,
    pub stale: u64,
    /// Refused by the aggregate (not found, conflicting challenger, ...).
    pub rejected: u64,
    /// Undecodable events and store failures.
    pub failed: u64,
}

impl ListenerStats {
    /// Events fully handled, whatever the outcome.
    pub fn processed(&self) -> u64 {
        self.applied + self.duplicate + self.stale + self.rejected + self.failed
    }
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    applied: AtomicU64,
    duplicate: AtomicU64,
    stale: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the listener handle and its background task.
#[derive(Default)]
struct Shared {
    listening: AtomicBool,
    last_processed_block: AtomicU64,
    counters: Counters,
}

struct Running {
    subscription_id: SubscriptionId,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct Control {
    state: ListenerState,
    running: Option<Running>,
}

/// Subscribes to the ledger and applies every event it receives.
pub struct EventListener<S, L> {
    handlers: Arc<SyncHandlers<S>>,
    ledger: Arc<L>,
    config: ListenerConfig,
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl<S, L> EventListener<S, L>
where
    S: ProjectionStore + 'static,
    L: Ledger + 'static,
{
    pub fn new(handlers: Arc<SyncHandlers<S>>, ledger: Arc<L>, config: ListenerConfig) -> Self {
        Self {
            handlers,
            ledger,
            config,
            shared: Arc::new(Shared::default()),
            control: Mutex::new(Control {
                state: ListenerState::Stopped,
                running: None,
            }),
        }
    }

    /// Whether the background task is consuming events.
    pub fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }

    /// Highest block among processed events, 0 before the first one.
    pub fn last_processed_block(&self) -> u64 {
        self.shared.last_processed_block.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ListenerStats {
        self.shared.counters.snapshot()
    }

    pub async fn state(&self) -> ListenerState {
        let control = self.control.lock().await;
        match control.state {
            ListenerState::Listening if !self.is_listening() => ListenerState::Stopped,
            state => state,
        }
    }

    /// Subscribe and start applying events. No-op unless stopped.
    pub async fn start(&self) -> Result<()> {
        let mut control = self.control.lock().await;

        // A task whose stream closed on its own leaves a finished handle
        if control.running.as_ref().is_some_and(|r| r.handle.is_finished()) {
            if let Some(finished) = control.running.take() {
                let _ = self.ledger.unsubscribe(finished.subscription_id).await;
            }
            control.state = ListenerState::Stopped;
        }

        if control.state != ListenerState::Stopped {
            tracing::debug!(state = ?control.state, "event listener already running");
            return Ok(());
        }

        control.state = ListenerState::Starting;
        let from_block = match self.resume_block().await {
            Ok(block) => block,
            Err(e) => {
                control.state = ListenerState::Stopped;
                return Err(e);
            }
        };

        let filter = EventFilter {
            contracts: self.config.contracts.clone(),
            from_block,
        };
        let subscription = match self.ledger.subscribe(filter).await {
            Ok(subscription) => subscription,
            Err(e) => {
                control.state = ListenerState::Stopped;
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shared.listening.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run(
            self.handlers.clone(),
            self.shared.clone(),
            self.config.cursor_name.clone(),
            subscription.events,
            shutdown_rx,
        ));

        control.running = Some(Running {
            subscription_id: subscription.id,
            shutdown: shutdown_tx,
            handle,
        });
        control.state = ListenerState::Listening;

        tracing::info!(
            from_block,
            contracts = self.config.contracts.len(),
            "event listener started"
        );
        Ok(())
    }

    /// Stop the background task and unsubscribe. Safe when not listening.
    pub async fn stop(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        let Some(running) = control.running.take() else {
            control.state = ListenerState::Stopped;
            self.shared.listening.store(false, Ordering::SeqCst);
            return Ok(());
        };

        let _ = running.shutdown.send(());
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "event listener task ended abnormally");
        }

        self.shared.listening.store(false, Ordering::SeqCst);
        control.state = ListenerState::Stopped;
        let unsubscribed = self.ledger.unsubscribe(running.subscription_id).await;

        tracing::info!(
            last_processed_block = self.last_processed_block(),
            "event listener stopped"
        );
        unsubscribed
    }

    async fn resume_block(&self) -> Result<u64> {
        if let Some(block) = self.config.start_block {
            return Ok(block);
        }
        let cursor = self
            .handlers
            .store()
            .get_cursor(&self.config.cursor_name)
            .await?;
        // Inclusive: later logs in the cursor block may not have been seen
        Ok(cursor.unwrap_or(0))
    }
}

async fn run<S: ProjectionStore>(
    handlers: Arc<SyncHandlers<S>>,
    shared: Arc<Shared>,
    cursor_name: String,
    mut events: mpsc::Receiver<RawLedgerEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("event listener received shutdown signal");
                break;
            }
            raw = events.recv() => match raw {
                Some(raw) => process(&handlers, &shared, &cursor_name, raw).await,
                None => {
                    tracing::warn!("ledger subscription closed");
                    break;
                }
            }
        }
    }

    shared.listening.store(false, Ordering::SeqCst);
}

async fn process<S: ProjectionStore>(
    handlers: &SyncHandlers<S>,
    shared: &Shared,
    cursor_name: &str,
    raw: RawLedgerEvent,
) {
    let counters = &shared.counters;
    Counters::bump(&counters.received);

    match raw.decode() {
        Err(e) => {
            Counters::bump(&counters.failed);
            tracing::warn!(
                name = %raw.name,
                block = raw.block_number,
                tx = %raw.tx_hash,
                error = %e,
                "dropping undecodable ledger event"
            );
        }
        Ok(event) => match handlers.apply(&event).await {
            Ok(outcome) => match outcome.disposition {
                Disposition::Applied => Counters::bump(&counters.applied),
                Disposition::Duplicate => Counters::bump(&counters.duplicate),
                Disposition::Stale { .. } => Counters::bump(&counters.stale),
            },
            Err(e) => {
                if e.is_rejection() {
                    Counters::bump(&counters.rejected);
                } else {
                    Counters::bump(&counters.failed);
                }
                tracing::warn!(
                    debate_id = %event.debate_id(),
                    event = %event.kind(),
                    block = raw.block_number,
                    tx = %raw.tx_hash,
                    error = %e,
                    "dropping ledger event"
                );
            }
        },
    }

    shared
        .last_processed_block
        .fetch_max(raw.block_number, Ordering::SeqCst);
    if let Err(e) = handlers
        .store()
        .advance_cursor(cursor_name, raw.block_number, now_millis())
        .await
    {
        tracing::warn!(error = %e, block = raw.block_number, "failed to persist listener cursor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use debate_sync_core::{
        Debate, DebateId, DebateStatus, FinalizedEvent, JoinedEvent, LedgerEvent, TxHash,
    };
    use debate_sync_store::MemoryStore;
    use std::time::Duration;

    const CONTRACT: Address = Address::ZERO;

    fn joined(id: u64, block: u64) -> JoinedEvent {
        JoinedEvent {
            debate_id: DebateId(id),
            opponent: Address::from_bytes([0xaa; 20]),
            tx_hash: TxHash::from_bytes([1; 32]),
            block_number: block,
        }
    }

    fn finalized(id: u64, block: u64) -> FinalizedEvent {
        FinalizedEvent {
            debate_id: DebateId(id),
            on_chain_winner: Address::from_bytes([0xaa; 20]),
            total_votes: 3,
            tx_hash: TxHash::from_bytes([2; 32]),
            block_number: block,
        }
    }

    async fn setup() -> (
        Arc<MemoryStore>,
        Arc<MemoryLedger>,
        EventListener<MemoryStore, MemoryLedger>,
    ) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_debate(&Debate::new(DebateId(1), Address::from_bytes([0xc0; 20]), 0))
            .await
            .unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let handlers = Arc::new(SyncHandlers::new(store.clone()));
        let listener = EventListener::new(handlers, ledger.clone(), ListenerConfig::default());
        (store, ledger, listener)
    }

    async fn wait_for_processed(listener: &EventListener<MemoryStore, MemoryLedger>, n: u64) {
        for _ in 0..400 {
            if listener.stats().processed() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("listener processed {} events, expected {}", listener.stats().processed(), n);
    }

    #[tokio::test]
    async fn test_listener_applies_events() {
        let (store, ledger, listener) = setup().await;
        listener.start().await.unwrap();
        assert!(listener.is_listening());
        assert_eq!(listener.state().await, ListenerState::Listening);

        ledger.emit(CONTRACT, joined(1, 100)).await;
        ledger.emit(CONTRACT, finalized(1, 105)).await;
        wait_for_processed(&listener, 2).await;

        let debate = store.get_debate(DebateId(1)).await.unwrap().unwrap();
        assert_eq!(debate.status, DebateStatus::Completed);
        assert_eq!(listener.last_processed_block(), 105);
        assert_eq!(store.get_cursor("event-listener").await.unwrap(), Some(105));
        assert_eq!(listener.stats().applied, 2);

        listener.stop().await.unwrap();
        assert!(!listener.is_listening());
        assert_eq!(ledger.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_is_noop_when_listening() {
        let (_store, ledger, listener) = setup().await;
        listener.start().await.unwrap();
        listener.start().await.unwrap();
        assert_eq!(ledger.subscriber_count().await, 1);
        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_safe() {
        let (_store, _ledger, listener) = setup().await;
        listener.stop().await.unwrap();
        assert_eq!(listener.state().await, ListenerState::Stopped);
    }

    #[tokio::test]
    async fn test_bad_events_are_dropped_and_loop_continues() {
        let (store, ledger, listener) = setup().await;
        listener.start().await.unwrap();

        let mut raw = LedgerEvent::from(joined(1, 90)).to_raw(CONTRACT, 0);
        raw.fields.remove("opponent");
        ledger.deliver(raw).await;

        // Unknown debate
        ledger.emit(CONTRACT, joined(42, 95)).await;
        // Valid, plus a duplicate delivery
        let valid = ledger.emit(CONTRACT, joined(1, 100)).await;
        ledger.deliver(valid).await;
        wait_for_processed(&listener, 4).await;

        let stats = listener.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.duplicate, 1);
        let debate = store.get_debate(DebateId(1)).await.unwrap().unwrap();
        assert_eq!(debate.status, DebateStatus::Active);

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_resumes_from_cursor() {
        let (store, ledger, listener) = setup().await;
        listener.start().await.unwrap();
        ledger.emit(CONTRACT, joined(1, 100)).await;
        wait_for_processed(&listener, 1).await;
        listener.stop().await.unwrap();

        // Missed while stopped
        ledger.emit(CONTRACT, finalized(1, 105)).await;

        listener.start().await.unwrap();
        // Replays block 100 (inclusive cursor) and 105
        wait_for_processed(&listener, 3).await;
        let debate = store.get_debate(DebateId(1)).await.unwrap().unwrap();
        assert_eq!(debate.status, DebateStatus::Completed);
        listener.stop().await.unwrap();
    }
}
