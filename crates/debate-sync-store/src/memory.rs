//! In-memory implementation of the ProjectionStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use debate_sync_core::{Debate, DebateId};

use crate::error::{Result, StoreError};
use crate::traits::{
    check_debate_ints, to_sql_int, CandidateQuery, InsertResult, ProjectionStore, UpdateResult,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Debates ordered by id.
    debates: BTreeMap<DebateId, Debate>,

    /// Named block cursors.
    cursors: HashMap<String, u64>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored debates.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.debates.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

#[async_trait]
impl ProjectionStore for MemoryStore {
    async fn insert_debate(&self, debate: &Debate) -> Result<InsertResult> {
        check_debate_ints(debate)?;
        let mut inner = self.write()?;
        if inner.debates.contains_key(&debate.id) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.debates.insert(debate.id, debate.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_debate(&self, id: DebateId) -> Result<Option<Debate>> {
        Ok(self.read()?.debates.get(&id).cloned())
    }

    async fn compare_and_swap(
        &self,
        debate: &Debate,
        expected_revision: u64,
    ) -> Result<UpdateResult> {
        check_debate_ints(debate)?;
        let mut inner = self.write()?;
        let Some(stored) = inner.debates.get_mut(&debate.id) else {
            return Ok(UpdateResult::Conflict);
        };

        let regresses = match (stored.block_number, debate.block_number) {
            (Some(_), None) => true,
            (Some(current), Some(next)) => next < current,
            (None, _) => false,
        };
        if stored.revision != expected_revision || regresses {
            return Ok(UpdateResult::Conflict);
        }

        let revision = expected_revision + 1;
        *stored = Debate {
            revision,
            ..debate.clone()
        };
        Ok(UpdateResult::Updated { revision })
    }

    async fn list_debate_ids(&self) -> Result<Vec<DebateId>> {
        Ok(self.read()?.debates.keys().copied().collect())
    }

    async fn list_reconciliation_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<Debate>> {
        let inner = self.read()?;
        let mut candidates: Vec<Debate> = inner
            .debates
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        candidates.sort_by_key(|d| (d.last_synced_block.unwrap_or(0), d.id));
        candidates.truncate(query.limit);
        Ok(candidates)
    }

    async fn advance_watermark(&self, id: DebateId, block: u64, at: i64) -> Result<bool> {
        to_sql_int("id", id.get())?;
        to_sql_int("block", block)?;
        let mut inner = self.write()?;
        let Some(debate) = inner.debates.get_mut(&id) else {
            return Ok(false);
        };
        debate.last_synced_block = Some(debate.last_synced_block.map_or(block, |b| b.max(block)));
        debate.last_synced_at = Some(at);
        debate.revision += 1;
        Ok(true)
    }

    async fn get_cursor(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.read()?.cursors.get(name).copied())
    }

    async fn advance_cursor(&self, name: &str, block: u64, _at: i64) -> Result<()> {
        to_sql_int("block", block)?;
        let mut inner = self.write()?;
        let cursor = inner.cursors.entry(name.to_string()).or_insert(block);
        *cursor = (*cursor).max(block);
        Ok(())
    }
}
