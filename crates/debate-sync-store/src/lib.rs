//! # Debate Sync Store
//!
//! Storage abstraction for the debate projection. Provides a trait-based
//! interface for debate persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`ProjectionStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`UpdateResult`] - Outcome of a revision-checked write
//! - [`CandidateQuery`] - Reconciliation selection criteria
//!
//! ## Usage
//!
//! ```rust,no_run
//! use debate_sync_core::{Address, Debate, DebateId, now_millis};
//! use debate_sync_store::{ProjectionStore, SqliteStore, UpdateResult};
//!
//! async fn example() -> debate_sync_store::Result<()> {
//!     let store = SqliteStore::open("projection.db")?;
//!
//!     let debate = Debate::new(DebateId(1), Address::ZERO, now_millis());
//!     store.insert_debate(&debate).await?;
//!
//!     // Every later write is conditional on the revision that was read
//!     let current = store.get_debate(DebateId(1)).await?.unwrap();
//!     match store.compare_and_swap(&current, current.revision).await? {
//!         UpdateResult::Updated { revision } => println!("now at revision {revision}"),
//!         UpdateResult::Conflict => println!("lost the race, re-read"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: inserting an existing id returns `AlreadyExists`
//! - **Optimistic concurrency**: writes are keyed by revision and never lower
//!   the stored block number
//! - **Monotonic watermarks**: reconciliation watermarks and listener cursors
//!   only move forward

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CandidateQuery, InsertResult, ProjectionStore, UpdateResult};
