//! Idempotent sync handlers: pure transitions plus one conditional write.
//!
//! The listener and reconciliation both call into [`SyncHandlers`]; they
//! never talk to each other. Each call reads the aggregate, runs the pure
//! transition from `debate_sync_core`, and writes with a compare-and-swap
//! on the aggregate's revision. A lost race re-reads and re-applies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use debate_sync_core::{
    apply_event, now_millis, Debate, FinalizedEvent, JoinedEvent, LedgerEvent,
    PrizeClaimedEvent, Transition, TransitionError,
};
use debate_sync_store::{ProjectionStore, UpdateResult};

use crate::error::{Result, SyncError};

/// What a handler call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Disposition {
    /// New state was written.
    Applied,
    /// Already reflected; nothing written.
    Duplicate,
    /// Older than the stored block; nothing written.
    Stale { incoming: u64, stored: u64 },
}

/// Result of a successful handler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub disposition: Disposition,
    /// The aggregate as stored after the call.
    pub debate: Debate,
}

impl HandlerOutcome {
    pub fn is_applied(&self) -> bool {
        self.disposition == Disposition::Applied
    }
}

/// Compare-and-swap attempts before giving up with `Contention`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Applies ledger events to the projection store.
pub struct SyncHandlers<S> {
    store: Arc<S>,
    max_attempts: u32,
}

impl<S: ProjectionStore> SyncHandlers<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn sync_joined(&self, event: JoinedEvent) -> Result<HandlerOutcome> {
        self.apply(&LedgerEvent::Joined(event)).await
    }

    pub async fn sync_finalized(&self, event: FinalizedEvent) -> Result<HandlerOutcome> {
        self.apply(&LedgerEvent::Finalized(event)).await
    }

    pub async fn sync_prize_claimed(&self, event: PrizeClaimedEvent) -> Result<HandlerOutcome> {
        self.apply(&LedgerEvent::PrizeClaimed(event)).await
    }

    /// Apply an event using the wall clock.
    pub async fn apply(&self, event: &LedgerEvent) -> Result<HandlerOutcome> {
        self.apply_at(event, now_millis()).await
    }

    /// Apply an event with `now` as the local timestamp.
    pub async fn apply_at(&self, event: &LedgerEvent, now: i64) -> Result<HandlerOutcome> {
        let debate_id = event.debate_id();

        for attempt in 1..=self.max_attempts {
            let Some(current) = self.store.get_debate(debate_id).await? else {
                return Err(TransitionError::NotFound(debate_id).into());
            };

            let mut next = match apply_event(Some(&current), event, now)? {
                Transition::Applied(next) => next,
                Transition::Duplicate => {
                    tracing::debug!(
                        debate_id = %debate_id,
                        event = %event.kind(),
                        block = event.block_number(),
                        "duplicate event"
                    );
                    return Ok(HandlerOutcome {
                        disposition: Disposition::Duplicate,
                        debate: current,
                    });
                }
                Transition::Stale { incoming, stored } => {
                    tracing::debug!(
                        debate_id = %debate_id,
                        event = %event.kind(),
                        incoming,
                        stored,
                        "stale event ignored"
                    );
                    return Ok(HandlerOutcome {
                        disposition: Disposition::Stale { incoming, stored },
                        debate: current,
                    });
                }
            };

            match self.store.compare_and_swap(&next, current.revision).await? {
                UpdateResult::Updated { revision } => {
                    next.revision = revision;
                    tracing::debug!(
                        debate_id = %debate_id,
                        event = %event.kind(),
                        block = event.block_number(),
                        tx = %event.tx_hash(),
                        status = %next.status,
                        "applied ledger event"
                    );
                    return Ok(HandlerOutcome {
                        disposition: Disposition::Applied,
                        debate: next,
                    });
                }
                UpdateResult::Conflict => {
                    tracing::debug!(debate_id = %debate_id, attempt, "revision conflict, re-reading");
                }
            }
        }

        Err(SyncError::Contention {
            debate_id,
            attempts: self.max_attempts,
        })
    }
}
