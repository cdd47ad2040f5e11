//! Ledger abstraction: event subscription and canonical-state queries.
//!
//! Implementations may wrap a JSON-RPC node, an indexer, or anything else
//! that can stream contract logs. Delivery is at-least-once and not
//! globally ordered; consumers must be idempotent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use debate_sync_core::{Address, CanonicalDebate, DebateId, RawLedgerEvent};

use crate::error::Result;

/// Identifies a live subscription for [`Ledger::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Which logs a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Emitting contracts to include. Empty means all.
    pub contracts: Vec<Address>,
    /// Replay history from this block (inclusive) before live events.
    pub from_block: u64,
}

impl EventFilter {
    pub fn matches(&self, event: &RawLedgerEvent) -> bool {
        event.block_number >= self.from_block
            && (self.contracts.is_empty() || self.contracts.contains(&event.contract))
    }
}

/// A live event stream.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::Receiver<RawLedgerEvent>,
}

/// The external ledger, as seen by the sync engine.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Open an event stream. Historical logs matching the filter are
    /// delivered first, then live ones.
    async fn subscribe(&self, filter: EventFilter) -> Result<Subscription>;

    /// Close a stream. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Highest block considered final.
    async fn confirmed_height(&self) -> Result<u64>;

    /// The ledger's view of a debate, or `None` if it has no record of it.
    async fn debate_state(&self, id: DebateId) -> Result<Option<CanonicalDebate>>;
}

/// An in-memory ledger for testing.
///
/// Keeps an append-only log and delivers it through channels. Tests can
/// drop, duplicate or reorder deliveries, and make state queries fail.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;

    use debate_sync_core::LedgerEvent;

    use crate::error::SyncError;

    /// Minimum per-subscription channel capacity.
    const SUBSCRIPTION_BUFFER: usize = 1000;

    struct Subscriber {
        filter: EventFilter,
        sender: mpsc::Sender<RawLedgerEvent>,
    }

    #[derive(Default)]
    struct LedgerState {
        log: Vec<RawLedgerEvent>,
        canonical: HashMap<DebateId, CanonicalDebate>,
        subscribers: HashMap<SubscriptionId, Subscriber>,
        next_subscription: u64,
        next_log_index: u32,
        head: u64,
        failing: HashSet<DebateId>,
    }

    /// In-memory ledger implementation.
    #[derive(Default)]
    pub struct MemoryLedger {
        state: RwLock<LedgerState>,
        confirmations: u64,
    }

    impl MemoryLedger {
        /// A ledger where every emitted block is immediately confirmed.
        pub fn new() -> Self {
            Self::default()
        }

        /// A ledger whose confirmed height trails the head by `confirmations`.
        pub fn with_confirmations(confirmations: u64) -> Self {
            Self {
                state: RwLock::new(LedgerState::default()),
                confirmations,
            }
        }

        /// Append an event to the log, record it, and deliver it.
        pub async fn emit(&self, contract: Address, event: impl Into<LedgerEvent>) -> RawLedgerEvent {
            let raw = self.record(contract, event.into()).await;
            self.deliver(raw.clone()).await;
            raw
        }

        /// Append an event to the log without delivering it to live
        /// subscribers, as if the notification were lost.
        pub async fn emit_without_delivery(
            &self,
            contract: Address,
            event: impl Into<LedgerEvent>,
        ) -> RawLedgerEvent {
            self.record(contract, event.into()).await
        }

        /// Deliver a raw log to live subscribers without recording it.
        ///
        /// Used to re-deliver an earlier event or inject a malformed one.
        pub async fn deliver(&self, raw: RawLedgerEvent) {
            let senders: Vec<_> = {
                let state = self.state.read().await;
                state
                    .subscribers
                    .values()
                    .filter(|s| s.filter.matches(&raw))
                    .map(|s| s.sender.clone())
                    .collect()
            };
            for sender in senders {
                // Closed receivers are cleaned up on unsubscribe
                let _ = sender.send(raw.clone()).await;
            }
        }

        /// Move the chain head forward.
        pub async fn advance_head(&self, block: u64) {
            let mut state = self.state.write().await;
            state.head = state.head.max(block);
        }

        /// Make state queries for `id` fail until [`MemoryLedger::heal`].
        pub async fn fail_state_queries(&self, id: DebateId) {
            self.state.write().await.failing.insert(id);
        }

        pub async fn heal(&self, id: DebateId) {
            self.state.write().await.failing.remove(&id);
        }

        pub async fn subscriber_count(&self) -> usize {
            self.state.read().await.subscribers.len()
        }

        /// Every log appended so far, in emission order.
        pub async fn log(&self) -> Vec<RawLedgerEvent> {
            self.state.read().await.log.clone()
        }

        async fn record(&self, contract: Address, event: LedgerEvent) -> RawLedgerEvent {
            let mut state = self.state.write().await;
            let raw = event.to_raw(contract, state.next_log_index);
            state.next_log_index += 1;
            state.head = state.head.max(event.block_number());
            state
                .canonical
                .entry(event.debate_id())
                .or_insert_with(|| CanonicalDebate::new(event.debate_id()))
                .record(&event);
            state.log.push(raw.clone());
            raw
        }
    }

    #[async_trait]
    impl Ledger for MemoryLedger {
        async fn subscribe(&self, filter: EventFilter) -> Result<Subscription> {
            let mut state = self.state.write().await;

            let backlog: Vec<RawLedgerEvent> = state
                .log
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect();
            let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER.max(backlog.len() + 1));
            for event in backlog {
                tx.try_send(event)
                    .map_err(|e| SyncError::Ledger(format!("backlog replay failed: {}", e)))?;
            }

            let id = SubscriptionId(state.next_subscription);
            state.next_subscription += 1;
            state.subscribers.insert(id, Subscriber { filter, sender: tx });

            Ok(Subscription { id, events: rx })
        }

        async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
            self.state.write().await.subscribers.remove(&id);
            Ok(())
        }

        async fn confirmed_height(&self) -> Result<u64> {
            let head = self.state.read().await.head;
            Ok(head.saturating_sub(self.confirmations))
        }

        async fn debate_state(&self, id: DebateId) -> Result<Option<CanonicalDebate>> {
            let state = self.state.read().await;
            if state.failing.contains(&id) {
                return Err(SyncError::Ledger(format!("state query for debate {} failed", id)));
            }
            Ok(state.canonical.get(&id).cloned())
        }
    }
}
