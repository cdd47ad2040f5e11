//! SQLite implementation of the ProjectionStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};

use debate_sync_core::{Debate, DebateId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{to_sql_int, CandidateQuery, InsertResult, ProjectionStore, UpdateResult};

const DEBATE_COLUMNS: &str = "id, creator, status, challenger, winner, on_chain_winner, \
     on_chain_status, total_votes, transaction_hash, block_number, sync_status, \
     last_synced_block, last_synced_at, prize_claimed, prize_claim_tx_hash, \
     prize_claim_block_number, prize_amount, prize_claimant, ended_at, created_at, \
     updated_at, revision";

/// Positional parameters follow `DEBATE_COLUMNS`; `?23` is the expected
/// revision. `?10` (the new block_number) guards against regressing.
const UPDATE_DEBATE: &str = "UPDATE debates SET
        creator = ?2, status = ?3, challenger = ?4, winner = ?5, on_chain_winner = ?6,
        on_chain_status = ?7, total_votes = ?8, transaction_hash = ?9, block_number = ?10,
        sync_status = ?11, last_synced_block = ?12, last_synced_at = ?13,
        prize_claimed = ?14, prize_claim_tx_hash = ?15, prize_claim_block_number = ?16,
        prize_amount = ?17, prize_claimant = ?18, ended_at = ?19, created_at = ?20,
        updated_at = ?21, revision = ?22
     WHERE id = ?1 AND revision = ?23
       AND (block_number IS NULL OR (?10 IS NOT NULL AND block_number <= ?10))";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// A debate flattened into SQL values, in `DEBATE_COLUMNS` order.
struct DebateRow {
    id: i64,
    creator: String,
    status: &'static str,
    challenger: Option<String>,
    winner: Option<String>,
    on_chain_winner: Option<String>,
    on_chain_status: Option<&'static str>,
    total_votes: Option<i64>,
    transaction_hash: Option<String>,
    block_number: Option<i64>,
    sync_status: &'static str,
    last_synced_block: Option<i64>,
    last_synced_at: Option<i64>,
    prize_claimed: bool,
    prize_claim_tx_hash: Option<String>,
    prize_claim_block_number: Option<i64>,
    prize_amount: Option<String>,
    prize_claimant: Option<String>,
    ended_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    revision: i64,
}

impl DebateRow {
    fn encode(debate: &Debate, revision: u64) -> Result<Self> {
        let opt_int = |field: &'static str, value: Option<u64>| value.map(|v| to_sql_int(field, v)).transpose();
        Ok(Self {
            id: to_sql_int("id", debate.id.get())?,
            creator: debate.creator.to_hex(),
            status: debate.status.as_str(),
            challenger: debate.challenger.map(|a| a.to_hex()),
            winner: debate.winner.map(|a| a.to_hex()),
            on_chain_winner: debate.on_chain_winner.map(|a| a.to_hex()),
            on_chain_status: debate.on_chain_status.map(|s| s.as_str()),
            total_votes: opt_int("total_votes", debate.total_votes)?,
            transaction_hash: debate.transaction_hash.map(|h| h.to_hex()),
            block_number: opt_int("block_number", debate.block_number)?,
            sync_status: debate.sync_status.as_str(),
            last_synced_block: opt_int("last_synced_block", debate.last_synced_block)?,
            last_synced_at: debate.last_synced_at,
            prize_claimed: debate.prize_claimed,
            prize_claim_tx_hash: debate.prize_claim_tx_hash.map(|h| h.to_hex()),
            prize_claim_block_number: opt_int(
                "prize_claim_block_number",
                debate.prize_claim_block_number,
            )?,
            prize_amount: debate.prize_amount.map(|a| a.to_string()),
            prize_claimant: debate.prize_claimant.map(|a| a.to_hex()),
            ended_at: debate.ended_at,
            created_at: debate.created_at,
            updated_at: debate.updated_at,
            revision: to_sql_int("revision", revision)?,
        })
    }

    fn values(&self) -> [&dyn ToSql; 22] {
        [
            &self.id,
            &self.creator,
            &self.status,
            &self.challenger,
            &self.winner,
            &self.on_chain_winner,
            &self.on_chain_status,
            &self.total_votes,
            &self.transaction_hash,
            &self.block_number,
            &self.sync_status,
            &self.last_synced_block,
            &self.last_synced_at,
            &self.prize_claimed,
            &self.prize_claim_tx_hash,
            &self.prize_claim_block_number,
            &self.prize_amount,
            &self.prize_claimant,
            &self.ended_at,
            &self.created_at,
            &self.updated_at,
            &self.revision,
        ]
    }
}

fn parse_text<T>(row: &Row<'_>, col: &str, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| {
        let idx = row.as_ref().column_index(col).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("{col}: {e}").into())
    })
}

fn text<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let value: String = row.get(col)?;
    parse_text(row, col, &value)
}

fn opt_text<T>(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let value: Option<String> = row.get(col)?;
    value.map(|v| parse_text(row, col, &v)).transpose()
}

fn opt_u64(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<u64>> {
    Ok(row.get::<_, Option<i64>>(col)?.map(|v| v as u64))
}

fn row_to_debate(row: &Row<'_>) -> rusqlite::Result<Debate> {
    Ok(Debate {
        id: DebateId(row.get::<_, i64>("id")? as u64),
        creator: text(row, "creator")?,
        status: text(row, "status")?,
        challenger: opt_text(row, "challenger")?,
        winner: opt_text(row, "winner")?,
        on_chain_winner: opt_text(row, "on_chain_winner")?,
        on_chain_status: opt_text(row, "on_chain_status")?,
        total_votes: opt_u64(row, "total_votes")?,
        transaction_hash: opt_text(row, "transaction_hash")?,
        block_number: opt_u64(row, "block_number")?,
        sync_status: text(row, "sync_status")?,
        last_synced_block: opt_u64(row, "last_synced_block")?,
        last_synced_at: row.get("last_synced_at")?,
        prize_claimed: row.get("prize_claimed")?,
        prize_claim_tx_hash: opt_text(row, "prize_claim_tx_hash")?,
        prize_claim_block_number: opt_u64(row, "prize_claim_block_number")?,
        prize_amount: opt_text(row, "prize_amount")?,
        prize_claimant: opt_text(row, "prize_claimant")?,
        ended_at: row.get("ended_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        revision: row.get::<_, i64>("revision")? as u64,
    })
}

#[async_trait]
impl ProjectionStore for SqliteStore {
    async fn insert_debate(&self, debate: &Debate) -> Result<InsertResult> {
        let encoded = DebateRow::encode(debate, debate.revision)?;

        self.blocking(move |conn| {
            let sql = format!(
                "INSERT OR IGNORE INTO debates ({DEBATE_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                  ?17, ?18, ?19, ?20, ?21, ?22)"
            );
            let inserted = conn.execute(&sql, params_from_iter(encoded.values()))?;

            Ok(if inserted == 0 {
                InsertResult::AlreadyExists
            } else {
                InsertResult::Inserted
            })
        })
        .await
    }

    async fn get_debate(&self, id: DebateId) -> Result<Option<Debate>> {
        let Ok(id) = i64::try_from(id.get()) else {
            return Ok(None);
        };

        self.blocking(move |conn| {
            let debate = conn
                .query_row(
                    &format!("SELECT {DEBATE_COLUMNS} FROM debates WHERE id = ?1"),
                    params![id],
                    row_to_debate,
                )
                .optional()?;
            Ok(debate)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        debate: &Debate,
        expected_revision: u64,
    ) -> Result<UpdateResult> {
        let revision = expected_revision + 1;
        let encoded = DebateRow::encode(debate, revision)?;
        let expected = to_sql_int("revision", expected_revision)?;

        self.blocking(move |conn| {
            let mut values: Vec<&dyn ToSql> = encoded.values().to_vec();
            values.push(&expected);
            let updated = conn.execute(UPDATE_DEBATE, params_from_iter(values))?;

            Ok(if updated == 0 {
                UpdateResult::Conflict
            } else {
                UpdateResult::Updated { revision }
            })
        })
        .await
    }

    async fn list_debate_ids(&self) -> Result<Vec<DebateId>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM debates ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .map(|r| r.map(|id| DebateId(id as u64)))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn list_reconciliation_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<Debate>> {
        let query = *query;
        // Bounds beyond the storable range select everything
        let lagging_below = i64::try_from(query.lagging_below).unwrap_or(i64::MAX);
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {DEBATE_COLUMNS} FROM debates
                 WHERE NOT (status = 'completed' AND on_chain_status = 'finalized'
                            AND prize_claimed = 1 AND sync_status = 'confirmed')
                   AND (COALESCE(last_synced_block, 0) < ?1
                        OR (sync_status = 'pending'
                            AND COALESCE(last_synced_at, created_at) < ?2))
                 ORDER BY COALESCE(last_synced_block, 0), id
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let debates = stmt
                .query_map(
                    params![
                        lagging_below,
                        query.unconfirmed_before,
                        limit
                    ],
                    row_to_debate,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(debates)
        })
        .await
    }

    async fn advance_watermark(&self, id: DebateId, block: u64, at: i64) -> Result<bool> {
        let id = to_sql_int("id", id.get())?;
        let block = to_sql_int("block", block)?;

        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE debates SET
                    last_synced_block = MAX(COALESCE(last_synced_block, ?2), ?2),
                    last_synced_at = ?3,
                    revision = revision + 1
                 WHERE id = ?1",
                params![id, block, at],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    async fn get_cursor(&self, name: &str) -> Result<Option<u64>> {
        let name = name.to_string();

        self.blocking(move |conn| {
            let block: Option<i64> = conn
                .query_row(
                    "SELECT block_number FROM sync_cursors WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(block.map(|b| b as u64))
        })
        .await
    }

    async fn advance_cursor(&self, name: &str, block: u64, at: i64) -> Result<()> {
        let name = name.to_string();
        let block = to_sql_int("block", block)?;

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO sync_cursors (name, block_number, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    block_number = MAX(block_number, excluded.block_number),
                    updated_at = excluded.updated_at",
                params![name, block, at],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debate_sync_core::{
        Address, Amount, DebateStatus, OnChainStatus, SyncStatus, TxHash,
    };

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn make_debate(id: u64) -> Debate {
        Debate::new(DebateId(id), addr(0xc0), 1_000)
    }

    fn completed(id: u64) -> Debate {
        let mut debate = make_debate(id);
        debate.status = DebateStatus::Completed;
        debate.challenger = Some(addr(0xaa));
        debate.winner = Some(addr(0xaa));
        debate.on_chain_winner = Some(addr(0xaa));
        debate.on_chain_status = Some(OnChainStatus::Finalized);
        debate.total_votes = Some(12);
        debate.transaction_hash = Some(TxHash::from_bytes([7; 32]));
        debate.block_number = Some(110);
        debate.sync_status = SyncStatus::Confirmed;
        debate.last_synced_block = Some(110);
        debate.last_synced_at = Some(2_000);
        debate.prize_claimed = true;
        debate.prize_claim_tx_hash = Some(TxHash::from_bytes([7; 32]));
        debate.prize_claim_block_number = Some(110);
        debate.prize_amount = Some(Amount(u128::MAX));
        debate.prize_claimant = Some(addr(0xaa));
        debate.ended_at = Some(1_500);
        debate
    }

    #[tokio::test]
    async fn test_insert_and_get_debate() {
        let store = SqliteStore::open_memory().unwrap();
        let debate = completed(1);

        let result = store.insert_debate(&debate).await.unwrap();
        assert_eq!(result, InsertResult::Inserted);

        let retrieved = store.get_debate(DebateId(1)).await.unwrap().unwrap();
        assert_eq!(retrieved, debate);
        assert!(store.get_debate(DebateId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idempotent_insert() {
        let store = SqliteStore::open_memory().unwrap();
        let debate = make_debate(1);

        assert_eq!(store.insert_debate(&debate).await.unwrap(), InsertResult::Inserted);
        assert_eq!(
            store.insert_debate(&completed(1)).await.unwrap(),
            InsertResult::AlreadyExists
        );

        // First write wins
        let stored = store.get_debate(DebateId(1)).await.unwrap().unwrap();
        assert_eq!(stored.status, DebateStatus::Pending);
    }

    #[tokio::test]
    async fn test_compare_and_swap_bumps_revision() {
        let store = SqliteStore::open_memory().unwrap();
        let mut debate = make_debate(1);
        store.insert_debate(&debate).await.unwrap();

        debate.status = DebateStatus::Active;
        debate.block_number = Some(100);
        let result = store.compare_and_swap(&debate, 0).await.unwrap();
        assert_eq!(result, UpdateResult::Updated { revision: 1 });

        // A writer still holding revision 0 loses
        let result = store.compare_and_swap(&debate, 0).await.unwrap();
        assert_eq!(result, UpdateResult::Conflict);

        let stored = store.get_debate(DebateId(1)).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.status, DebateStatus::Active);
    }

    #[tokio::test]
    async fn test_compare_and_swap_refuses_lower_block() {
        let store = SqliteStore::open_memory().unwrap();
        let debate = make_debate(1).with_creation_tx(TxHash::from_bytes([1; 32]), 100);
        store.insert_debate(&debate).await.unwrap();

        let mut older = debate.clone();
        older.block_number = Some(99);
        assert_eq!(store.compare_and_swap(&older, 0).await.unwrap(), UpdateResult::Conflict);

        let mut cleared = debate.clone();
        cleared.block_number = None;
        assert_eq!(store.compare_and_swap(&cleared, 0).await.unwrap(), UpdateResult::Conflict);

        let mut same = debate;
        same.status = DebateStatus::Active;
        assert!(matches!(
            store.compare_and_swap(&same, 0).await.unwrap(),
            UpdateResult::Updated { .. }
        ));
    }

    #[tokio::test]
    async fn test_compare_and_swap_missing_row_conflicts() {
        let store = SqliteStore::open_memory().unwrap();
        let result = store.compare_and_swap(&make_debate(9), 0).await.unwrap();
        assert_eq!(result, UpdateResult::Conflict);
    }

    #[tokio::test]
    async fn test_watermark_only_moves_forward() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_debate(&make_debate(1)).await.unwrap();

        assert!(store.advance_watermark(DebateId(1), 200, 5_000).await.unwrap());
        assert!(store.advance_watermark(DebateId(1), 150, 6_000).await.unwrap());
        assert!(!store.advance_watermark(DebateId(2), 150, 6_000).await.unwrap());

        let stored = store.get_debate(DebateId(1)).await.unwrap().unwrap();
        assert_eq!(stored.last_synced_block, Some(200));
        assert_eq!(stored.last_synced_at, Some(6_000));
        assert_eq!(stored.revision, 2);
        // Nothing else moved
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.block_number, None);
    }

    #[tokio::test]
    async fn test_reconciliation_candidates() {
        let store = SqliteStore::open_memory().unwrap();

        // Lagging
        let mut lagging = make_debate(1);
        lagging.last_synced_block = Some(50);
        lagging.sync_status = SyncStatus::Confirmed;
        lagging.last_synced_at = Some(9_000);
        // Up to date
        let mut fresh = make_debate(2);
        fresh.last_synced_block = Some(150);
        fresh.sync_status = SyncStatus::Confirmed;
        fresh.last_synced_at = Some(9_000);
        // Terminal, despite lagging
        let mut terminal = completed(3);
        terminal.last_synced_block = Some(10);
        // Never synced: lagging from block 0
        let never = make_debate(4);

        for debate in [&lagging, &fresh, &terminal, &never] {
            store.insert_debate(debate).await.unwrap();
        }

        let query = CandidateQuery {
            lagging_below: 100,
            unconfirmed_before: 0,
            limit: 10,
        };
        let ids: Vec<_> = store
            .list_reconciliation_candidates(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![DebateId(4), DebateId(1)]);

        let limited = CandidateQuery { limit: 1, ..query };
        assert_eq!(store.list_reconciliation_candidates(&limited).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_debate_selected_after_grace() {
        let store = SqliteStore::open_memory().unwrap();
        let mut debate = make_debate(1);
        debate.last_synced_block = Some(500);
        store.insert_debate(&debate).await.unwrap();

        let within_grace = CandidateQuery {
            lagging_below: 100,
            unconfirmed_before: 1_000,
            limit: 10,
        };
        assert!(store.list_reconciliation_candidates(&within_grace).await.unwrap().is_empty());

        let past_grace = CandidateQuery {
            unconfirmed_before: 1_001,
            ..within_grace
        };
        assert_eq!(store.list_reconciliation_candidates(&past_grace).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_is_monotonic() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.get_cursor("listener").await.unwrap(), None);

        store.advance_cursor("listener", 120, 1).await.unwrap();
        store.advance_cursor("listener", 80, 2).await.unwrap();
        assert_eq!(store.get_cursor("listener").await.unwrap(), Some(120));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projection.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_debate(&completed(1)).await.unwrap();
            store.advance_cursor("listener", 42, 1).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_debate_ids().await.unwrap(), vec![DebateId(1)]);
        assert_eq!(store.get_cursor("listener").await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_out_of_range_integers_are_invalid_data() {
        let store = SqliteStore::open_memory().unwrap();
        let debate = make_debate(1);
        store.insert_debate(&debate).await.unwrap();

        let mut next = debate.clone();
        next.block_number = Some(1 << 63);
        let err = store.compare_and_swap(&next, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        assert_eq!(store.get_debate(DebateId(1)).await.unwrap().unwrap().revision, 0);

        let err = store.insert_debate(&make_debate(u64::MAX)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        assert!(store.get_debate(DebateId(u64::MAX)).await.unwrap().is_none());
        assert!(store.advance_watermark(DebateId(1), u64::MAX, 1).await.is_err());
    }
}
