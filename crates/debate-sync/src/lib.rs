//! # Debate Sync
//!
//! Keeps a local projection of debates in step with the ledger that owns
//! them.
//!
//! ## Overview
//!
//! Clients submit transactions to the ledger; this crate never does. It
//! observes what the ledger did and reflects it:
//!
//! - **Listener**: applies ledger events as they are delivered
//! - **Webhooks**: relays can push the same events through typed payloads
//! - **Reconciliation**: a periodic pass re-derives lagging debates from the
//!   ledger's canonical state and repairs whatever was missed
//! - **Submission guards**: per-actor rate limiting and bounded retry for the
//!   client side
//!
//! Delivery is at-least-once and unordered. Every write is an idempotent
//! transition behind a revision check that never lowers the stored block,
//! so all paths converge on the same state.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use debate_sync::{ServiceConfig, SyncService};
//! use debate_sync::ledger::MemoryLedger;
//! use debate_sync::store::SqliteStore;
//!
//! async fn example() -> Result<(), debate_sync::SyncServiceError> {
//!     let store = Arc::new(SqliteStore::open("projection.db")?);
//!     let ledger = Arc::new(MemoryLedger::new());
//!     let service = SyncService::new(store, ledger, ServiceConfig::default());
//!
//!     service.start_listening().await?;
//!     let interval = service.config().reconcile.interval();
//!     service.start_reconciliation_service(interval).await?;
//!
//!     // ...
//!
//!     service.shutdown().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `debate_sync::core` - Aggregate, events and pure transitions
//! - `debate_sync::store` - Projection store trait, SQLite and memory stores
//! - `debate_sync::ledger` - Ledger trait, handlers, listener, reconciliation
//! - `debate_sync::submit` - Rate limiting and retry

pub mod config;
pub mod error;
pub mod payload;
pub mod service;

// Re-export component crates
pub use debate_sync_core as core;
pub use debate_sync_ledger as ledger;
pub use debate_sync_store as store;
pub use debate_sync_submit as submit;

// Re-export main types for convenience
pub use config::ServiceConfig;
pub use error::{Result, SyncServiceError};
pub use payload::{FieldValue, FinalizedPayload, JoinedPayload, PrizeClaimedPayload, SyncResponse};
pub use service::SyncService;

// Re-export commonly used types
pub use debate_sync_core::{Address, Amount, Debate, DebateId, DebateStatus, TxHash};
pub use debate_sync_ledger::{Disposition, ListenerStats, ReconciliationReport};
