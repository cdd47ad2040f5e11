//! Error types for the sync service.

use thiserror::Error;

use debate_sync_core::{DebateId, TransitionError, ValidationError};
use debate_sync_ledger::SyncError;
use debate_sync_store::StoreError;

/// Top-level service errors.
#[derive(Debug, Error)]
pub enum SyncServiceError {
    /// A webhook payload or raw event was malformed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced debate does not exist in the projection.
    #[error("debate not found: {0}")]
    NotFound(DebateId),

    /// The debate exists but refused the event.
    #[error("event rejected: {0}")]
    Rejected(TransitionError),

    /// Listener, reconciliation or ledger failure.
    #[error("sync error: {0}")]
    Sync(SyncError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid operation for the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<TransitionError> for SyncServiceError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NotFound(id) => SyncServiceError::NotFound(id),
            other => SyncServiceError::Rejected(other),
        }
    }
}

impl From<SyncError> for SyncServiceError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Transition(e) => e.into(),
            SyncError::Decode(e) => SyncServiceError::Validation(e),
            SyncError::Store(e) => SyncServiceError::Store(e),
            other => SyncServiceError::Sync(other),
        }
    }
}

impl SyncServiceError {
    /// HTTP status an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            SyncServiceError::Validation(_) => 400,
            SyncServiceError::NotFound(_) => 404,
            SyncServiceError::Rejected(_) => 409,
            _ => 500,
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, SyncServiceError>;
