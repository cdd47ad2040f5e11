//! Pure state transitions: one function per ledger event type.
//!
//! Each transition takes the current aggregate (or `None` if the store has
//! no such debate) and an event, and returns the next state or a reason it
//! cannot be applied. No I/O happens here; the store layer wraps these in a
//! conditional write.
//!
//! # Rules shared by every transition
//!
//! - An event whose block is strictly older than the stored `block_number`
//!   is [`Transition::Stale`] and changes nothing.
//! - Re-delivery of an event already reflected in the state is
//!   [`Transition::Duplicate`] and changes nothing.
//! - `status` only advances along `pending → active → completed`.

use crate::debate::{Debate, DebateStatus, OnChainStatus};
use crate::error::TransitionError;
use crate::events::{FinalizedEvent, JoinedEvent, LedgerEvent, PrizeClaimedEvent};

/// Result of applying an event to an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The event produced a new state that must be persisted.
    Applied(Debate),
    /// The event is already reflected; nothing to write.
    Duplicate,
    /// The event is older than the stored state; nothing to write.
    Stale { incoming: u64, stored: u64 },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// Dispatch an event to its transition.
pub fn apply_event(
    current: Option<&Debate>,
    event: &LedgerEvent,
    now: i64,
) -> Result<Transition, TransitionError> {
    match event {
        LedgerEvent::Joined(e) => apply_joined(current, e, now),
        LedgerEvent::Finalized(e) => apply_finalized(current, e, now),
        LedgerEvent::PrizeClaimed(e) => apply_prize_claimed(current, e, now),
    }
}

fn stale(debate: &Debate, incoming: u64) -> Option<Transition> {
    match debate.block_number {
        Some(stored) if incoming < stored => Some(Transition::Stale { incoming, stored }),
        _ => None,
    }
}

/// A challenger joined.
///
/// Only a pending debate can be joined. Re-delivery of the join that set
/// the current challenger is a duplicate; any other challenger is rejected.
pub fn apply_joined(
    current: Option<&Debate>,
    event: &JoinedEvent,
    now: i64,
) -> Result<Transition, TransitionError> {
    let debate = current.ok_or(TransitionError::NotFound(event.debate_id))?;

    if let Some(stale) = stale(debate, event.block_number) {
        return Ok(stale);
    }

    match debate.challenger {
        Some(existing) if existing == event.opponent => return Ok(Transition::Duplicate),
        Some(existing) => {
            return Err(TransitionError::ChallengerAlreadySet {
                debate_id: debate.id,
                existing,
                incoming: event.opponent,
            })
        }
        None => {}
    }

    if debate.status != DebateStatus::Pending {
        return Err(TransitionError::NotJoinable {
            debate_id: debate.id,
            status: debate.status,
        });
    }

    let mut next = debate.clone();
    next.challenger = Some(event.opponent);
    next.status = next.status.advance_to(DebateStatus::Active);
    next.record_transaction(event.tx_hash, event.block_number, now);
    Ok(Transition::Applied(next))
}

/// The ledger recorded the outcome.
///
/// Once finalized, the on-chain fields are authoritative and any further
/// finalize delivery is a duplicate.
pub fn apply_finalized(
    current: Option<&Debate>,
    event: &FinalizedEvent,
    now: i64,
) -> Result<Transition, TransitionError> {
    let debate = current.ok_or(TransitionError::NotFound(event.debate_id))?;

    if let Some(stale) = stale(debate, event.block_number) {
        return Ok(stale);
    }

    if debate.is_finalized() {
        return Ok(Transition::Duplicate);
    }

    let mut next = debate.clone();
    next.status = next.status.advance_to(DebateStatus::Completed);
    next.on_chain_winner = Some(event.on_chain_winner);
    next.on_chain_status = Some(OnChainStatus::Finalized);
    next.winner = Some(event.on_chain_winner);
    next.total_votes = Some(event.total_votes);
    next.ended_at = Some(now);
    next.record_transaction(event.tx_hash, event.block_number, now);
    Ok(Transition::Applied(next))
}

/// The winner claimed the prize.
///
/// Claim fields are written exactly once. A claim for a debate that is
/// not completed locally is rejected so that the missing finalization can
/// be replayed first.
pub fn apply_prize_claimed(
    current: Option<&Debate>,
    event: &PrizeClaimedEvent,
    now: i64,
) -> Result<Transition, TransitionError> {
    let debate = current.ok_or(TransitionError::NotFound(event.debate_id))?;

    if debate.prize_claimed {
        return Ok(Transition::Duplicate);
    }

    if let Some(stale) = stale(debate, event.block_number) {
        return Ok(stale);
    }

    if debate.status != DebateStatus::Completed {
        return Err(TransitionError::NotClaimable {
            debate_id: debate.id,
            status: debate.status,
        });
    }

    let mut next = debate.clone();
    next.prize_claimed = true;
    next.prize_claim_tx_hash = Some(event.tx_hash);
    next.prize_claim_block_number = Some(event.block_number);
    next.prize_amount = Some(event.amount);
    next.prize_claimant = Some(event.winner);
    next.record_transaction(event.tx_hash, event.block_number, now);
    Ok(Transition::Applied(next))
}
