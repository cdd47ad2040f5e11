//! Error types for submissions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure signatures that retrying cannot fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FatalKind {
    InsufficientBalance,
    AlreadyJoined,
    NotPending,
    Expired,
    UserRejected,
}

impl FatalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatalKind::InsufficientBalance => "insufficient balance",
            FatalKind::AlreadyJoined => "already joined",
            FatalKind::NotPending => "not pending",
            FatalKind::Expired => "expired",
            FatalKind::UserRejected => "user rejected",
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a submission ultimately failed. Wraps the operation's last error.
#[derive(Debug, Error)]
pub enum SubmissionError<E> {
    /// Propagated on the first occurrence, without retrying.
    #[error("fatal submission error ({kind}): {error}")]
    Fatal { kind: FatalKind, error: E },

    /// Every attempt failed with a retryable error.
    #[error("submission failed after {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: E },
}

impl<E> SubmissionError<E> {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SubmissionError::Fatal { .. })
    }

    /// The operation's own error.
    pub fn error(&self) -> &E {
        match self {
            SubmissionError::Fatal { error, .. } | SubmissionError::Exhausted { error, .. } => error,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            SubmissionError::Fatal { error, .. } | SubmissionError::Exhausted { error, .. } => error,
        }
    }
}
