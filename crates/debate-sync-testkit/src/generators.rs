//! Proptest generators for property-based testing.

use proptest::prelude::*;

use debate_sync_core::{
    Address, Amount, DebateId, FinalizedEvent, JoinedEvent, LedgerEvent, PrizeClaimedEvent, TxHash,
};

/// Generate a random Address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

/// Generate a random TxHash.
pub fn tx_hash() -> impl Strategy<Value = TxHash> {
    any::<[u8; 32]>().prop_map(TxHash::from_bytes)
}

/// Generate a prize amount.
pub fn amount() -> impl Strategy<Value = Amount> {
    (1u128..=u128::from(u64::MAX) * 1_000).prop_map(Amount)
}

/// One debate's ledger history: a join, then optionally a finalization,
/// then optionally a claim, at strictly increasing blocks.
#[derive(Debug, Clone)]
pub struct DebateHistory {
    pub id: DebateId,
    pub join: JoinedEvent,
    pub finalization: Option<FinalizedEvent>,
    pub prize_claim: Option<PrizeClaimedEvent>,
}

impl DebateHistory {
    /// The history's events in block order.
    pub fn events(&self) -> Vec<LedgerEvent> {
        let mut events = vec![LedgerEvent::from(self.join.clone())];
        events.extend(self.finalization.clone().map(LedgerEvent::from));
        events.extend(self.prize_claim.clone().map(LedgerEvent::from));
        events
    }

    /// Block of the last event.
    pub fn head_block(&self) -> u64 {
        self.events()
            .last()
            .map_or(self.join.block_number, LedgerEvent::block_number)
    }
}

impl Arbitrary for DebateHistory {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            1u64..=1_000,        // debate id
            address(),           // opponent
            address(),           // winner
            1u64..=1_000_000,    // join block
            1u64..=500,          // finalize gap
            1u64..=500,          // claim gap
            0u8..3,              // events after the join
            0u64..=100,          // votes
            amount(),
            (tx_hash(), tx_hash(), tx_hash()),
        )
            .prop_map(
                |(id, opponent, winner, join_block, fin_gap, claim_gap, extra, votes, amount, txs)| {
                    let id = DebateId(id);
                    let fin_block = join_block + fin_gap;
                    let claim_block = fin_block + claim_gap;
                    DebateHistory {
                        id,
                        join: JoinedEvent {
                            debate_id: id,
                            opponent,
                            tx_hash: txs.0,
                            block_number: join_block,
                        },
                        finalization: (extra >= 1).then(|| FinalizedEvent {
                            debate_id: id,
                            on_chain_winner: winner,
                            total_votes: votes,
                            tx_hash: txs.1,
                            block_number: fin_block,
                        }),
                        prize_claim: (extra >= 2).then(|| PrizeClaimedEvent {
                            debate_id: id,
                            winner,
                            amount,
                            tx_hash: txs.2,
                            block_number: claim_block,
                        }),
                    }
                },
            )
            .boxed()
    }
}

/// Merge two sequences, taking from `a` where `picks` says true and from
/// `b` otherwise, while both have elements left. Each input keeps its
/// relative order.
pub fn interleave<T: Clone>(a: &[T], b: &[T], picks: &[bool]) -> Vec<T> {
    let (mut i, mut j) = (0, 0);
    let mut merged = Vec::with_capacity(a.len() + b.len());
    for &pick in picks {
        if i < a.len() && (pick || j == b.len()) {
            merged.push(a[i].clone());
            i += 1;
        } else if j < b.len() {
            merged.push(b[j].clone());
            j += 1;
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}

/// A history plus a delivery schedule where the listener and
/// reconciliation each deliver the whole history in block order, arbitrarily
/// interleaved.
pub fn two_source_delivery() -> impl Strategy<Value = (DebateHistory, Vec<LedgerEvent>)> {
    any::<DebateHistory>().prop_flat_map(|history| {
        let events = history.events();
        prop::collection::vec(any::<bool>(), events.len() * 2).prop_map(move |picks| {
            let deliveries = interleave(&events, &events, &picks);
            (history.clone(), deliveries)
        })
    })
}

/// A finalized history whose finalization is delivered first, followed by
/// the whole history in block order. The join then arrives below the
/// stored block.
pub fn out_of_order_delivery() -> impl Strategy<Value = (DebateHistory, Vec<LedgerEvent>)> {
    any::<DebateHistory>()
        .prop_filter("history must be finalized", |h| h.finalization.is_some())
        .prop_map(|history| {
            let mut deliveries: Vec<LedgerEvent> = history
                .finalization
                .clone()
                .map(LedgerEvent::from)
                .into_iter()
                .collect();
            deliveries.extend(history.events());
            (history, deliveries)
        })
}

/// An event for `id` at a block strictly below `below`, with arbitrary
/// contents.
pub fn event_below(id: DebateId, below: u64) -> impl Strategy<Value = LedgerEvent> {
    let block = 0..below.max(1);
    prop_oneof![
        (address(), tx_hash(), block.clone()).prop_map(move |(opponent, tx_hash, block_number)| {
            LedgerEvent::Joined(JoinedEvent {
                debate_id: id,
                opponent,
                tx_hash,
                block_number,
            })
        }),
        (address(), any::<u64>(), tx_hash(), block.clone()).prop_map(
            move |(on_chain_winner, total_votes, tx_hash, block_number)| {
                LedgerEvent::Finalized(FinalizedEvent {
                    debate_id: id,
                    on_chain_winner,
                    total_votes,
                    tx_hash,
                    block_number,
                })
            }
        ),
        (address(), amount(), tx_hash(), block).prop_map(
            move |(winner, amount, tx_hash, block_number)| {
                LedgerEvent::PrizeClaimed(PrizeClaimedEvent {
                    debate_id: id,
                    winner,
                    amount,
                    tx_hash,
                    block_number,
                })
            }
        ),
    ]
}
