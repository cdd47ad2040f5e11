//! # Debate Sync Ledger
//!
//! Keeps the debate projection in step with the ledger.
//!
//! ## Overview
//!
//! Two independent paths write to the projection, and both go through
//! [`SyncHandlers`]:
//!
//! - [`EventListener`] consumes a live [`Ledger`] subscription.
//! - [`ReconciliationService`] periodically re-derives lagging debates from
//!   the ledger's canonical state.
//!
//! They never communicate directly. Because every handler call is an
//! idempotent transition behind a revision-checked write, any number of
//! deliveries of the same event, from either path and in any order,
//! leave the store in the same state.
//!
//! ## Key Properties
//!
//! - **Idempotent**: duplicate deliveries are recognised and write nothing
//! - **Monotonic**: events older than the stored block are ignored
//! - **Self-healing**: dropped events are replayed by reconciliation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use debate_sync_ledger::{
//!     EventListener, ListenerConfig, MemoryLedger, ReconcileConfig,
//!     ReconciliationService, SyncHandlers,
//! };
//! use debate_sync_store::SqliteStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("projection.db")?);
//!     let ledger = Arc::new(MemoryLedger::new());
//!     let handlers = Arc::new(SyncHandlers::new(store));
//!
//!     let listener = EventListener::new(handlers.clone(), ledger.clone(), ListenerConfig::default());
//!     listener.start().await?;
//!
//!     let reconciler = ReconciliationService::new(handlers, ledger, ReconcileConfig::default());
//!     let report = reconciler.run_pass().await?;
//!     println!("repaired {} debates", report.repaired);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod ledger;
pub mod listener;
pub mod reconcile;

pub use error::{Result, SyncError};
pub use handlers::{Disposition, HandlerOutcome, SyncHandlers, DEFAULT_MAX_ATTEMPTS};
pub use ledger::{memory::MemoryLedger, EventFilter, Ledger, Subscription, SubscriptionId};
pub use listener::{EventListener, ListenerConfig, ListenerState, ListenerStats};
pub use reconcile::{ReconcileConfig, ReconciliationReport, ReconciliationService};
