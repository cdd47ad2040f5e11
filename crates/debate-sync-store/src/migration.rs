//! Database schema migrations for SQLite.
//!
//! Versioned: each migration moves the schema from version N to N+1 and is
//! recorded in `schema_migrations`.

use rusqlite::Connection;

use debate_sync_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current = current_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated projection schema");
    }

    Ok(())
}

/// Highest applied migration, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: debates projection and listener cursors.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per debate, projected from ledger events
        CREATE TABLE debates (
            id INTEGER PRIMARY KEY,
            creator TEXT NOT NULL,                -- 0x-prefixed hex address
            status TEXT NOT NULL,                 -- pending | active | completed
            challenger TEXT,
            winner TEXT,
            on_chain_winner TEXT,
            on_chain_status TEXT,                 -- open | joined | finalized
            total_votes INTEGER,
            transaction_hash TEXT,
            block_number INTEGER,                 -- never decreases
            sync_status TEXT NOT NULL,            -- pending | confirmed
            last_synced_block INTEGER,
            last_synced_at INTEGER,
            prize_claimed INTEGER NOT NULL DEFAULT 0,
            prize_claim_tx_hash TEXT,
            prize_claim_block_number INTEGER,
            prize_amount TEXT,                    -- decimal, may exceed i64
            prize_claimant TEXT,
            ended_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0   -- optimistic concurrency token
        );

        CREATE INDEX idx_debates_status ON debates(status, sync_status);
        CREATE INDEX idx_debates_watermark ON debates(last_synced_block);

        -- Named block cursors (listener resume point)
        CREATE TABLE sync_cursors (
            name TEXT PRIMARY KEY,
            block_number INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_rejects_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, 0)",
            [CURRENT_VERSION + 1],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
