//! ProjectionStore trait: the abstract interface for debate persistence.
//!
//! This trait allows the sync engine to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use debate_sync_core::{Debate, DebateId, SyncStatus};

use crate::error::{Result, StoreError};

/// Convert an unsigned ledger integer to SQLite's signed 64-bit storage.
///
/// Both stores reject the same values so they never disagree on ordering.
pub(crate) fn to_sql_int(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{field} {value} exceeds i64::MAX")))
}

/// Check every integer column of `debate` fits in storage.
pub(crate) fn check_debate_ints(debate: &Debate) -> Result<()> {
    to_sql_int("id", debate.id.get())?;
    let optional = [
        ("total_votes", debate.total_votes),
        ("block_number", debate.block_number),
        ("last_synced_block", debate.last_synced_block),
        ("prize_claim_block_number", debate.prize_claim_block_number),
    ];
    for (field, value) in optional {
        if let Some(value) = value {
            to_sql_int(field, value)?;
        }
    }
    Ok(())
}

/// Result of inserting a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Debate was inserted.
    Inserted,
    /// A debate with this id already exists (idempotent - not an error).
    AlreadyExists,
}

/// Result of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// The row was written; `revision` is the new revision.
    Updated { revision: u64 },
    /// The stored row moved on since it was read. Re-read and retry.
    Conflict,
}

/// Selection criteria for reconciliation.
///
/// A debate is a candidate when it is not terminal and either its
/// watermark is below `lagging_below`, or it is still unconfirmed and its
/// watermark (or creation time) is older than `unconfirmed_before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateQuery {
    /// Block below which a watermark counts as lagging.
    pub lagging_below: u64,
    /// Unix ms before which an unconfirmed debate counts as overdue.
    pub unconfirmed_before: i64,
    /// Maximum debates to return, most-lagging first.
    pub limit: usize,
}

impl CandidateQuery {
    /// Whether `debate` satisfies this query.
    pub fn matches(&self, debate: &Debate) -> bool {
        if debate.is_terminal() {
            return false;
        }
        let lagging = debate.last_synced_block.unwrap_or(0) < self.lagging_below;
        let overdue = debate.sync_status == SyncStatus::Pending
            && debate.last_synced_at.unwrap_or(debate.created_at) < self.unconfirmed_before;
        lagging || overdue
    }
}

/// The ProjectionStore trait: async interface for debate persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Conditional writes**: every mutation of an existing debate goes
///   through [`ProjectionStore::compare_and_swap`], keyed by id and
///   revision, which also refuses to lower `block_number`.
/// - **Monotonic watermarks**: `advance_watermark` and `advance_cursor`
///   only ever move forward.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Debate Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a newly created debate.
    async fn insert_debate(&self, debate: &Debate) -> Result<InsertResult>;

    /// Get a debate by id.
    async fn get_debate(&self, id: DebateId) -> Result<Option<Debate>>;

    /// Replace a debate if its stored revision is still `expected_revision`.
    ///
    /// The write also fails with `Conflict` if it would lower the stored
    /// `block_number`. On success the stored revision is
    /// `expected_revision + 1`, whatever `debate.revision` says.
    async fn compare_and_swap(&self, debate: &Debate, expected_revision: u64)
        -> Result<UpdateResult>;

    /// List all debate ids, ascending.
    async fn list_debate_ids(&self) -> Result<Vec<DebateId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    /// Debates that reconciliation should re-derive, most-lagging first.
    async fn list_reconciliation_candidates(&self, query: &CandidateQuery)
        -> Result<Vec<Debate>>;

    /// Record that the debate is known correct through `block`.
    ///
    /// Moves `last_synced_block` to `max(current, block)` and stamps
    /// `last_synced_at`. Touches no other field. Returns false if the
    /// debate does not exist.
    async fn advance_watermark(&self, id: DebateId, block: u64, at: i64) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Cursors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a named block cursor (e.g. the listener's last processed block).
    async fn get_cursor(&self, name: &str) -> Result<Option<u64>>;

    /// Move a named cursor to `max(current, block)`.
    async fn advance_cursor(&self, name: &str, block: u64, at: i64) -> Result<()>;
}
