//! Ledger events: the typed payloads and their raw log form.
//!
//! The contract emits three events. A [`RawLedgerEvent`] is what a ledger
//! subscription hands us (string-keyed fields); [`RawLedgerEvent::decode`]
//! turns it into a [`LedgerEvent`] or a [`ValidationError`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;
use crate::types::{Address, Amount, DebateId, TxHash};

/// Raw field names used in contract logs.
pub mod fields {
    pub const DEBATE_ID: &str = "debateId";
    pub const OPPONENT: &str = "opponent";
    pub const WINNER: &str = "winner";
    pub const TOTAL_VOTES: &str = "totalVotes";
    pub const AMOUNT: &str = "amount";
    pub const BLOCK_NUMBER: &str = "blockNumber";
}

/// Largest debate index, block number or vote count accepted from the
/// ledger. The projection stores these as signed 64-bit integers.
pub const MAX_LEDGER_INT: u64 = i64::MAX as u64;

/// Reject ledger integers the projection cannot store.
pub fn check_ledger_int(field: &'static str, value: u64) -> Result<u64, ValidationError> {
    if value > MAX_LEDGER_INT {
        return Err(ValidationError::invalid(
            field,
            format!("{value} exceeds {MAX_LEDGER_INT}"),
        ));
    }
    Ok(value)
}

/// Discriminator for ledger event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Joined,
    Finalized,
    PrizeClaimed,
}

impl EventKind {
    /// The event name as emitted by the contract.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Joined => "DebateJoined",
            EventKind::Finalized => "DebateFinalized",
            EventKind::PrizeClaimed => "PrizeClaimed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DebateJoined" => Some(EventKind::Joined),
            "DebateFinalized" => Some(EventKind::Finalized),
            "PrizeClaimed" => Some(EventKind::PrizeClaimed),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A challenger joined a pending debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedEvent {
    pub debate_id: DebateId,
    pub opponent: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// The contract recorded the debate outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedEvent {
    pub debate_id: DebateId,
    pub on_chain_winner: Address,
    pub total_votes: u64,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// The winner withdrew the prize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeClaimedEvent {
    pub debate_id: DebateId,
    pub winner: Address,
    pub amount: Amount,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// A decoded ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    Joined(JoinedEvent),
    Finalized(FinalizedEvent),
    PrizeClaimed(PrizeClaimedEvent),
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::Joined(_) => EventKind::Joined,
            LedgerEvent::Finalized(_) => EventKind::Finalized,
            LedgerEvent::PrizeClaimed(_) => EventKind::PrizeClaimed,
        }
    }

    pub fn debate_id(&self) -> DebateId {
        match self {
            LedgerEvent::Joined(e) => e.debate_id,
            LedgerEvent::Finalized(e) => e.debate_id,
            LedgerEvent::PrizeClaimed(e) => e.debate_id,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            LedgerEvent::Joined(e) => e.block_number,
            LedgerEvent::Finalized(e) => e.block_number,
            LedgerEvent::PrizeClaimed(e) => e.block_number,
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        match self {
            LedgerEvent::Joined(e) => e.tx_hash,
            LedgerEvent::Finalized(e) => e.tx_hash,
            LedgerEvent::PrizeClaimed(e) => e.tx_hash,
        }
    }

    /// Encode as a raw log emitted by `contract`.
    pub fn to_raw(&self, contract: Address, log_index: u32) -> RawLedgerEvent {
        let mut out = BTreeMap::new();
        out.insert(fields::DEBATE_ID.to_string(), self.debate_id().to_string());
        match self {
            LedgerEvent::Joined(e) => {
                out.insert(fields::OPPONENT.to_string(), e.opponent.to_hex());
            }
            LedgerEvent::Finalized(e) => {
                out.insert(fields::WINNER.to_string(), e.on_chain_winner.to_hex());
                out.insert(fields::TOTAL_VOTES.to_string(), e.total_votes.to_string());
            }
            LedgerEvent::PrizeClaimed(e) => {
                out.insert(fields::WINNER.to_string(), e.winner.to_hex());
                out.insert(fields::AMOUNT.to_string(), e.amount.to_string());
            }
        }

        RawLedgerEvent {
            contract,
            name: self.kind().name().to_string(),
            block_number: self.block_number(),
            tx_hash: self.tx_hash(),
            log_index,
            fields: out,
        }
    }
}

impl From<JoinedEvent> for LedgerEvent {
    fn from(e: JoinedEvent) -> Self {
        LedgerEvent::Joined(e)
    }
}

impl From<FinalizedEvent> for LedgerEvent {
    fn from(e: FinalizedEvent) -> Self {
        LedgerEvent::Finalized(e)
    }
}

impl From<PrizeClaimedEvent> for LedgerEvent {
    fn from(e: PrizeClaimedEvent) -> Self {
        LedgerEvent::PrizeClaimed(e)
    }
}

/// An undecoded contract log as delivered by a ledger subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLedgerEvent {
    /// Emitting contract.
    pub contract: Address,
    /// Event name, e.g. `DebateJoined`.
    pub name: String,
    pub block_number: u64,
    pub tx_hash: TxHash,
    /// Position of the log within its block.
    pub log_index: u32,
    /// Decoded event arguments, stringly typed.
    pub fields: BTreeMap<String, String>,
}

impl RawLedgerEvent {
    /// Decode into a typed event, validating every required field.
    pub fn decode(&self) -> Result<LedgerEvent, ValidationError> {
        let kind = EventKind::from_name(&self.name)
            .ok_or_else(|| ValidationError::UnknownEvent(self.name.clone()))?;

        let debate_id: DebateId = self.parse_field(fields::DEBATE_ID)?;
        check_ledger_int(fields::DEBATE_ID, debate_id.get())?;
        let tx_hash = self.tx_hash;
        let block_number = check_ledger_int(fields::BLOCK_NUMBER, self.block_number)?;

        let event = match kind {
            EventKind::Joined => LedgerEvent::Joined(JoinedEvent {
                debate_id,
                opponent: self.parse_field(fields::OPPONENT)?,
                tx_hash,
                block_number,
            }),
            EventKind::Finalized => LedgerEvent::Finalized(FinalizedEvent {
                debate_id,
                on_chain_winner: self.parse_field(fields::WINNER)?,
                total_votes: check_ledger_int(
                    fields::TOTAL_VOTES,
                    self.parse_field(fields::TOTAL_VOTES)?,
                )?,
                tx_hash,
                block_number,
            }),
            EventKind::PrizeClaimed => LedgerEvent::PrizeClaimed(PrizeClaimedEvent {
                debate_id,
                winner: self.parse_field(fields::WINNER)?,
                amount: self.parse_field(fields::AMOUNT)?,
                tx_hash,
                block_number,
            }),
        };

        Ok(event)
    }

    fn parse_field<T>(&self, field: &'static str) -> Result<T, ValidationError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        let value = self
            .fields
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or(ValidationError::MissingField(field))?;
        value
            .parse()
            .map_err(|e| ValidationError::invalid(field, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined() -> LedgerEvent {
        LedgerEvent::Joined(JoinedEvent {
            debate_id: DebateId(7),
            opponent: Address::from_bytes([0x11; 20]),
            tx_hash: TxHash::from_bytes([0x22; 32]),
            block_number: 100,
        })
    }

    #[test]
    fn test_raw_decode_matches_encoded_event() {
        let event = LedgerEvent::PrizeClaimed(PrizeClaimedEvent {
            debate_id: DebateId(3),
            winner: Address::from_bytes([0x33; 20]),
            amount: Amount(1_000_000_000_000_000_000),
            tx_hash: TxHash::from_bytes([0x44; 32]),
            block_number: 250,
        });
        let raw = event.to_raw(Address::ZERO, 2);
        assert_eq!(raw.name, "PrizeClaimed");
        assert_eq!(raw.decode().unwrap(), event);
    }

    #[test]
    fn test_decode_unknown_event() {
        let mut raw = joined().to_raw(Address::ZERO, 0);
        raw.name = "DebateCancelled".into();
        assert_eq!(
            raw.decode().unwrap_err(),
            ValidationError::UnknownEvent("DebateCancelled".into())
        );
    }

    #[test]
    fn test_decode_missing_field() {
        let mut raw = joined().to_raw(Address::ZERO, 0);
        raw.fields.remove(fields::OPPONENT);
        assert_eq!(
            raw.decode().unwrap_err(),
            ValidationError::MissingField(fields::OPPONENT)
        );
    }

    #[test]
    fn test_decode_blank_field_is_missing() {
        let mut raw = joined().to_raw(Address::ZERO, 0);
        raw.fields.insert(fields::DEBATE_ID.into(), "  ".into());
        assert_eq!(
            raw.decode().unwrap_err(),
            ValidationError::MissingField(fields::DEBATE_ID)
        );
    }

    #[test]
    fn test_decode_malformed_address() {
        let mut raw = joined().to_raw(Address::ZERO, 0);
        raw.fields.insert(fields::OPPONENT.into(), "0x1234".into());
        assert!(matches!(
            raw.decode().unwrap_err(),
            ValidationError::InvalidField { field: "opponent", .. }
        ));
    }

    #[test]
    fn test_decode_rejects_unstorable_integers() {
        let mut raw = joined().to_raw(Address::ZERO, 0);
        raw.block_number = MAX_LEDGER_INT + 1;
        assert!(matches!(
            raw.decode().unwrap_err(),
            ValidationError::InvalidField { field: fields::BLOCK_NUMBER, .. }
        ));

        raw.block_number = MAX_LEDGER_INT;
        assert!(raw.decode().is_ok());

        raw.fields.insert(fields::DEBATE_ID.into(), u64::MAX.to_string());
        assert!(matches!(
            raw.decode().unwrap_err(),
            ValidationError::InvalidField { field: fields::DEBATE_ID, .. }
        ));
    }
}
