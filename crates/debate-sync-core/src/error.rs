//! Error types for debate sync core.

use thiserror::Error;

use crate::debate::DebateStatus;
use crate::types::{Address, DebateId};

/// A payload was missing a required field or a field did not parse.
///
/// Rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

impl ValidationError {
    /// Build an `InvalidField` from any displayable parse error.
    pub fn invalid(field: &'static str, reason: impl std::fmt::Display) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.to_string(),
        }
    }
}

/// Reasons a ledger event cannot be applied to an aggregate.
///
/// Stale and duplicate deliveries are not errors; see
/// [`Transition`](crate::transition::Transition).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The referenced debate does not exist in the projection.
    #[error("debate not found: {0}")]
    NotFound(DebateId),

    /// A different challenger already joined this debate.
    #[error("debate {debate_id} already has challenger {existing}, rejecting {incoming}")]
    ChallengerAlreadySet {
        debate_id: DebateId,
        existing: Address,
        incoming: Address,
    },

    /// The debate is past the point where a challenger can join.
    #[error("debate {debate_id} is {status} and cannot be joined")]
    NotJoinable {
        debate_id: DebateId,
        status: DebateStatus,
    },

    /// A prize claim arrived for a debate that is not completed locally.
    #[error("debate {debate_id} is {status}; prize claim requires completed")]
    NotClaimable {
        debate_id: DebateId,
        status: DebateStatus,
    },
}

impl TransitionError {
    /// The debate this error refers to.
    pub fn debate_id(&self) -> DebateId {
        match self {
            TransitionError::NotFound(id) => *id,
            TransitionError::ChallengerAlreadySet { debate_id, .. }
            | TransitionError::NotJoinable { debate_id, .. }
            | TransitionError::NotClaimable { debate_id, .. } => *debate_id,
        }
    }
}
