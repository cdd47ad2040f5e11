//! # Debate Sync Core
//!
//! Pure primitives for projecting debate state from ledger events.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the [`Debate`] aggregate and the events that change it.
//!
//! ## Key Types
//!
//! - [`Debate`] - The projected aggregate
//! - [`LedgerEvent`] - Typed `Joined | Finalized | PrizeClaimed` payloads
//! - [`RawLedgerEvent`] - A contract log before decoding
//! - [`CanonicalDebate`] - The ledger's own view, used for reconciliation
//! - [`Transition`] - Outcome of applying an event
//!
//! ## Transitions
//!
//! All state changes go through [`transition::apply_event`]. Transitions
//! are idempotent and reject events older than the stored block, so any
//! number of deliveries from any source converge on the same state.

pub mod canonical;
pub mod debate;
pub mod error;
pub mod events;
pub mod transition;
pub mod types;

pub use canonical::CanonicalDebate;
pub use debate::{Debate, DebateStatus, OnChainStatus, SyncStatus};
pub use error::{TransitionError, ValidationError};
pub use events::{
    check_ledger_int, EventKind, FinalizedEvent, JoinedEvent, LedgerEvent, PrizeClaimedEvent,
    RawLedgerEvent, MAX_LEDGER_INT,
};
pub use transition::{apply_event, Transition};
pub use types::{now_millis, Address, Amount, DebateId, HexIdError, TxHash};
