//! Debate: the aggregate projected from ledger events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{Address, Amount, DebateId, TxHash};

/// Lifecycle status of a debate.
///
/// Ordered: a status only ever advances to a later variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateStatus {
    Pending,
    Active,
    Completed,
}

impl DebateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateStatus::Pending => "pending",
            DebateStatus::Active => "active",
            DebateStatus::Completed => "completed",
        }
    }

    /// Move to `target` if it is later in the lifecycle, otherwise stay.
    pub fn advance_to(self, target: DebateStatus) -> DebateStatus {
        self.max(target)
    }
}

impl fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DebateStatus::Pending),
            "active" => Ok(DebateStatus::Active),
            "completed" => Ok(DebateStatus::Completed),
            other => Err(format!("unknown debate status: {other}")),
        }
    }
}

/// The ledger's own view of a debate's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnChainStatus {
    Open,
    Joined,
    Finalized,
}

impl OnChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnChainStatus::Open => "open",
            OnChainStatus::Joined => "joined",
            OnChainStatus::Finalized => "finalized",
        }
    }
}

impl FromStr for OnChainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OnChainStatus::Open),
            "joined" => Ok(OnChainStatus::Joined),
            "finalized" => Ok(OnChainStatus::Finalized),
            other => Err(format!("unknown on-chain status: {other}")),
        }
    }
}

/// Whether the last observed transaction is trusted as confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Confirmed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Confirmed => "confirmed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "confirmed" => Ok(SyncStatus::Confirmed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// The projected state of a single debate.
///
/// Mutated only through [`crate::transition`]; the store persists whatever
/// the transitions produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debate {
    /// Stable identifier, immutable after creation.
    pub id: DebateId,

    /// Account that created the debate.
    pub creator: Address,

    pub status: DebateStatus,

    /// Set once by the first successful join.
    pub challenger: Option<Address>,

    /// Derived from `on_chain_winner` once that is known.
    pub winner: Option<Address>,

    /// Ledger-reported winner, set only by finalization.
    pub on_chain_winner: Option<Address>,

    /// Ledger-reported status, set only by finalization.
    pub on_chain_status: Option<OnChainStatus>,

    /// Vote count reported at finalization.
    pub total_votes: Option<u64>,

    /// Latest ledger transaction that touched this debate.
    pub transaction_hash: Option<TxHash>,

    /// Block of `transaction_hash`. Never decreases.
    pub block_number: Option<u64>,

    pub sync_status: SyncStatus,

    /// Highest block known to be reflected in this state.
    pub last_synced_block: Option<u64>,

    /// When the watermark last moved (Unix ms).
    pub last_synced_at: Option<i64>,

    pub prize_claimed: bool,
    pub prize_claim_tx_hash: Option<TxHash>,
    pub prize_claim_block_number: Option<u64>,
    pub prize_amount: Option<Amount>,
    pub prize_claimant: Option<Address>,

    /// Local time finalization was applied (Unix ms).
    pub ended_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,

    /// Optimistic-concurrency token, bumped by the store on every write.
    pub revision: u64,
}

impl Debate {
    /// A freshly created debate awaiting a challenger.
    pub fn new(id: DebateId, creator: Address, now: i64) -> Self {
        Self {
            id,
            creator,
            status: DebateStatus::Pending,
            challenger: None,
            winner: None,
            on_chain_winner: None,
            on_chain_status: None,
            total_votes: None,
            transaction_hash: None,
            block_number: None,
            sync_status: SyncStatus::Pending,
            last_synced_block: None,
            last_synced_at: None,
            prize_claimed: false,
            prize_claim_tx_hash: None,
            prize_claim_block_number: None,
            prize_amount: None,
            prize_claimant: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Record the creation transaction, if the creation flow knows it.
    pub fn with_creation_tx(mut self, tx_hash: TxHash, block_number: u64) -> Self {
        self.transaction_hash = Some(tx_hash);
        self.block_number = Some(block_number);
        self
    }

    /// True if an event at `block` is older than the latest applied one.
    pub fn is_stale(&self, block: u64) -> bool {
        matches!(self.block_number, Some(stored) if block < stored)
    }

    pub fn is_finalized(&self) -> bool {
        self.on_chain_status == Some(OnChainStatus::Finalized)
    }

    /// No further ledger event can change this debate.
    pub fn is_terminal(&self) -> bool {
        self.status == DebateStatus::Completed
            && self.is_finalized()
            && self.prize_claimed
            && self.sync_status == SyncStatus::Confirmed
    }

    /// Record the transaction that produced this state and move the watermark.
    ///
    /// Callers must have checked [`Debate::is_stale`] first.
    pub(crate) fn record_transaction(&mut self, tx_hash: TxHash, block: u64, now: i64) {
        self.transaction_hash = Some(tx_hash);
        self.block_number = Some(self.block_number.map_or(block, |b| b.max(block)));
        self.sync_status = SyncStatus::Confirmed;
        self.last_synced_block = Some(self.last_synced_block.map_or(block, |b| b.max(block)));
        self.last_synced_at = Some(now);
        self.updated_at = now;
    }
}
