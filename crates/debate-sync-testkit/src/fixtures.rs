//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use debate_sync_core::{
    Address, Amount, Debate, DebateId, FinalizedEvent, JoinedEvent, PrizeClaimedEvent, TxHash,
};
use debate_sync_ledger::{MemoryLedger, SyncHandlers};
use debate_sync_store::{MemoryStore, ProjectionStore};

/// Address with every byte set to `n`.
pub fn addr(n: u8) -> Address {
    Address::from_bytes([n; 20])
}

/// Transaction hash with every byte set to `n`.
pub fn tx(n: u8) -> TxHash {
    TxHash::from_bytes([n; 32])
}

/// Transaction hash unique to a debate and block.
pub fn tx_at(id: DebateId, block: u64) -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&id.get().to_be_bytes());
    bytes[8..16].copy_from_slice(&block.to_be_bytes());
    TxHash::from_bytes(bytes)
}

/// Poll `condition` every 5ms for up to two seconds.
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition().await
}

/// A memory store and memory ledger sharing one contract address.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryLedger>,
    pub contract: Address,
    pub creator: Address,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_ledger(MemoryLedger::new())
    }

    /// Ledger that treats the newest `confirmations` blocks as unconfirmed.
    pub fn with_confirmations(confirmations: u64) -> Self {
        Self::with_ledger(MemoryLedger::with_confirmations(confirmations))
    }

    fn with_ledger(ledger: MemoryLedger) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            ledger: Arc::new(ledger),
            contract: addr(0xcc),
            creator: addr(0xc0),
        }
    }

    pub fn handlers(&self) -> Arc<SyncHandlers<MemoryStore>> {
        Arc::new(SyncHandlers::new(self.store.clone()))
    }

    /// Insert a pending debate created at time 0.
    pub async fn create_debate(&self, id: u64) -> Debate {
        let debate = Debate::new(DebateId(id), self.creator, 0);
        self.store
            .insert_debate(&debate)
            .await
            .expect("insert into memory store");
        debate
    }

    pub async fn debate(&self, id: u64) -> Option<Debate> {
        self.store
            .get_debate(DebateId(id))
            .await
            .expect("read from memory store")
    }

    pub fn joined(&self, id: u64, opponent: u8, block: u64) -> JoinedEvent {
        JoinedEvent {
            debate_id: DebateId(id),
            opponent: addr(opponent),
            tx_hash: tx_at(DebateId(id), block),
            block_number: block,
        }
    }

    pub fn finalized(&self, id: u64, winner: u8, block: u64) -> FinalizedEvent {
        FinalizedEvent {
            debate_id: DebateId(id),
            on_chain_winner: addr(winner),
            total_votes: 10,
            tx_hash: tx_at(DebateId(id), block),
            block_number: block,
        }
    }

    pub fn prize_claimed(&self, id: u64, winner: u8, amount: u128, block: u64) -> PrizeClaimedEvent {
        PrizeClaimedEvent {
            debate_id: DebateId(id),
            winner: addr(winner),
            amount: Amount(amount),
            tx_hash: tx_at(DebateId(id), block),
            block_number: block,
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
