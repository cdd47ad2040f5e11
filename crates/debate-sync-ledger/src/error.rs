//! Error types for the ledger sync module.

use thiserror::Error;

use debate_sync_core::{DebateId, TransitionError, ValidationError};

/// Errors that can occur while applying or reconciling ledger events.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The event could not be applied to the current aggregate.
    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] debate_sync_store::StoreError),

    /// A raw ledger event failed to decode.
    #[error("decode error: {0}")]
    Decode(#[from] ValidationError),

    /// Ledger-level error (subscription, query).
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Every conditional write lost to a concurrent writer.
    #[error("store contention on debate {debate_id} after {attempts} attempts")]
    Contention { debate_id: DebateId, attempts: u32 },

    /// Canonical state for one debate could not be fetched.
    #[error("failed to fetch canonical state for debate {debate_id}: {message}")]
    ReconciliationFetch { debate_id: DebateId, message: String },
}

impl SyncError {
    /// The aggregate refused the event, as opposed to an infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SyncError::Transition(_))
    }

    /// The debate the event targeted does not exist locally.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Transition(TransitionError::NotFound(_)))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
