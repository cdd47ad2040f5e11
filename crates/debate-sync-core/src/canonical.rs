//! The ledger's canonical view of a debate.
//!
//! Reconciliation fetches this from the ledger and replays it through the
//! same transitions the listener uses, so both repair paths share one set
//! of rules.

use serde::{Deserialize, Serialize};

use crate::debate::OnChainStatus;
use crate::events::{FinalizedEvent, JoinedEvent, LedgerEvent, PrizeClaimedEvent};
use crate::types::DebateId;

/// Everything the ledger knows about one debate, as the events that built it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDebate {
    pub id: DebateId,
    pub join: Option<JoinedEvent>,
    pub finalization: Option<FinalizedEvent>,
    pub prize_claim: Option<PrizeClaimedEvent>,
}

impl CanonicalDebate {
    pub fn new(id: DebateId) -> Self {
        Self {
            id,
            join: None,
            finalization: None,
            prize_claim: None,
        }
    }

    /// Fold an event into the ledger view.
    ///
    /// Ledger records are write-once; returns false if the slot was
    /// already filled or the event belongs to another debate.
    pub fn record(&mut self, event: &LedgerEvent) -> bool {
        if event.debate_id() != self.id {
            return false;
        }
        match event {
            LedgerEvent::Joined(e) if self.join.is_none() => {
                self.join = Some(e.clone());
                true
            }
            LedgerEvent::Finalized(e) if self.finalization.is_none() => {
                self.finalization = Some(e.clone());
                true
            }
            LedgerEvent::PrizeClaimed(e) if self.prize_claim.is_none() => {
                self.prize_claim = Some(e.clone());
                true
            }
            _ => false,
        }
    }

    pub fn on_chain_status(&self) -> OnChainStatus {
        if self.finalization.is_some() {
            OnChainStatus::Finalized
        } else if self.join.is_some() {
            OnChainStatus::Joined
        } else {
            OnChainStatus::Open
        }
    }

    /// All recorded events in block order.
    ///
    /// Ties keep lifecycle order (join, finalize, claim).
    pub fn events(&self) -> Vec<LedgerEvent> {
        let mut events: Vec<LedgerEvent> = [
            self.join.clone().map(LedgerEvent::from),
            self.finalization.clone().map(LedgerEvent::from),
            self.prize_claim.clone().map(LedgerEvent::from),
        ]
        .into_iter()
        .flatten()
        .collect();
        events.sort_by_key(LedgerEvent::block_number);
        events
    }

    /// Events at or below `height`, in block order.
    pub fn events_through(&self, height: u64) -> Vec<LedgerEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.block_number() <= height)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, TxHash};

    fn finalized(block: u64) -> LedgerEvent {
        LedgerEvent::Finalized(FinalizedEvent {
            debate_id: DebateId(1),
            on_chain_winner: Address::from_bytes([1; 20]),
            total_votes: 9,
            tx_hash: TxHash::from_bytes([2; 32]),
            block_number: block,
        })
    }

    fn joined(block: u64) -> LedgerEvent {
        LedgerEvent::Joined(JoinedEvent {
            debate_id: DebateId(1),
            opponent: Address::from_bytes([3; 20]),
            tx_hash: TxHash::from_bytes([4; 32]),
            block_number: block,
        })
    }

    #[test]
    fn test_record_is_write_once() {
        let mut canonical = CanonicalDebate::new(DebateId(1));
        assert!(canonical.record(&finalized(105)));
        assert!(!canonical.record(&finalized(200)));
        assert_eq!(canonical.finalization.as_ref().unwrap().block_number, 105);
        assert_eq!(canonical.on_chain_status(), OnChainStatus::Finalized);
    }

    #[test]
    fn test_events_sorted_by_block_with_stable_ties() {
        let mut canonical = CanonicalDebate::new(DebateId(1));
        canonical.record(&finalized(100));
        canonical.record(&joined(100));

        let kinds: Vec<_> = canonical.events().iter().map(LedgerEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![crate::events::EventKind::Joined, crate::events::EventKind::Finalized]
        );
    }

    #[test]
    fn test_events_through_excludes_unconfirmed() {
        let mut canonical = CanonicalDebate::new(DebateId(1));
        canonical.record(&joined(100));
        canonical.record(&finalized(150));
        assert_eq!(canonical.events_through(120).len(), 1);
        assert_eq!(canonical.events_through(150).len(), 2);
    }

    #[test]
    fn test_record_ignores_other_debates() {
        let mut canonical = CanonicalDebate::new(DebateId(2));
        assert!(!canonical.record(&joined(100)));
        assert!(canonical.join.is_none());
    }
}
