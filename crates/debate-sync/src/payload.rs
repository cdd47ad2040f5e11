//! Webhook payloads relayed by HTTP handlers.
//!
//! Relays send loosely typed JSON: numbers may arrive as JSON numbers or
//! strings, and any field may be missing. Payloads deserialize leniently
//! and [`validate`](JoinedPayload::validate) turns them into typed events
//! or a [`ValidationError`] before any state is touched.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use debate_sync_core::{
    check_ledger_int, Address, DebateId, DebateStatus, FinalizedEvent, JoinedEvent, PrizeClaimedEvent,
    ValidationError,
};
use debate_sync_ledger::{Disposition, HandlerOutcome};

/// A scalar as relayed: JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u64),
    Text(String),
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// Parse a required field. Blank strings count as missing.
fn required<T>(name: &'static str, value: &Option<FieldValue>) -> Result<T, ValidationError>
where
    T: FromStr,
    T::Err: Display,
{
    let text = match value {
        None => return Err(ValidationError::MissingField(name)),
        Some(FieldValue::Number(n)) => n.to_string(),
        Some(FieldValue::Text(s)) => s.trim().to_string(),
    };
    if text.is_empty() {
        return Err(ValidationError::MissingField(name));
    }
    text.parse().map_err(|e| ValidationError::invalid(name, e))
}

/// Parse a required integer the projection can store.
fn required_int(name: &'static str, value: &Option<FieldValue>) -> Result<u64, ValidationError> {
    check_ledger_int(name, required(name, value)?)
}

fn required_id(value: &Option<FieldValue>) -> Result<DebateId, ValidationError> {
    required_int("debateId", value).map(DebateId)
}

/// `DebateJoined` webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinedPayload {
    pub debate_id: Option<FieldValue>,
    pub opponent: Option<FieldValue>,
    #[serde(alias = "txHash")]
    pub transaction_hash: Option<FieldValue>,
    pub block_number: Option<FieldValue>,
}

impl JoinedPayload {
    pub fn validate(&self) -> Result<JoinedEvent, ValidationError> {
        Ok(JoinedEvent {
            debate_id: required_id(&self.debate_id)?,
            opponent: required("opponent", &self.opponent)?,
            tx_hash: required("transactionHash", &self.transaction_hash)?,
            block_number: required_int("blockNumber", &self.block_number)?,
        })
    }
}

/// `DebateFinalized` webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinalizedPayload {
    pub debate_id: Option<FieldValue>,
    #[serde(alias = "onChainWinner")]
    pub winner: Option<FieldValue>,
    pub total_votes: Option<FieldValue>,
    #[serde(alias = "txHash")]
    pub transaction_hash: Option<FieldValue>,
    pub block_number: Option<FieldValue>,
}

impl FinalizedPayload {
    pub fn validate(&self) -> Result<FinalizedEvent, ValidationError> {
        Ok(FinalizedEvent {
            debate_id: required_id(&self.debate_id)?,
            on_chain_winner: required("winner", &self.winner)?,
            total_votes: required_int("totalVotes", &self.total_votes)?,
            tx_hash: required("transactionHash", &self.transaction_hash)?,
            block_number: required_int("blockNumber", &self.block_number)?,
        })
    }
}

/// `PrizeClaimed` webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrizeClaimedPayload {
    pub debate_id: Option<FieldValue>,
    pub winner: Option<FieldValue>,
    /// Base units; send as a string when it exceeds `u64`.
    pub amount: Option<FieldValue>,
    #[serde(alias = "txHash")]
    pub transaction_hash: Option<FieldValue>,
    pub block_number: Option<FieldValue>,
}

impl PrizeClaimedPayload {
    pub fn validate(&self) -> Result<PrizeClaimedEvent, ValidationError> {
        Ok(PrizeClaimedEvent {
            debate_id: required_id(&self.debate_id)?,
            winner: required("winner", &self.winner)?,
            amount: required("amount", &self.amount)?,
            tx_hash: required("transactionHash", &self.transaction_hash)?,
            block_number: required_int("blockNumber", &self.block_number)?,
        })
    }
}

/// Body returned to the relay after a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub debate_id: DebateId,
    pub status: DebateStatus,
    pub challenger: Option<Address>,
    pub winner: Option<Address>,
    pub on_chain_winner: Option<Address>,
    pub prize_claimed: bool,
    pub block_number: Option<u64>,
    /// Whether the event was applied, already known, or stale.
    pub outcome: Disposition,
}

impl From<HandlerOutcome> for SyncResponse {
    fn from(outcome: HandlerOutcome) -> Self {
        let debate = outcome.debate;
        Self {
            success: true,
            debate_id: debate.id,
            status: debate.status,
            challenger: debate.challenger,
            winner: debate.winner,
            on_chain_winner: debate.on_chain_winner,
            prize_claimed: debate.prize_claimed,
            block_number: debate.block_number,
            outcome: outcome.disposition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debate_sync_core::{Amount, TxHash};

    const OPPONENT: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TX: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[test]
    fn test_joined_accepts_numbers_and_strings() {
        let payload: JoinedPayload = serde_json::from_str(&format!(
            r#"{{"debateId": "7", "opponent": "{OPPONENT}", "txHash": "{TX}", "blockNumber": 100}}"#
        ))
        .unwrap();

        let event = payload.validate().unwrap();
        assert_eq!(event.debate_id, DebateId(7));
        assert_eq!(event.opponent, Address::from_bytes([0xaa; 20]));
        assert_eq!(event.tx_hash, TxHash::from_bytes([0x11; 32]));
        assert_eq!(event.block_number, 100);
    }

    #[test]
    fn test_missing_field_reported_by_name() {
        let payload = JoinedPayload {
            debate_id: Some(7.into()),
            opponent: Some(OPPONENT.into()),
            transaction_hash: Some(TX.into()),
            block_number: None,
        };
        assert_eq!(
            payload.validate().unwrap_err(),
            ValidationError::MissingField("blockNumber")
        );
    }

    #[test]
    fn test_blank_string_is_missing() {
        let payload = FinalizedPayload {
            debate_id: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(
            payload.validate().unwrap_err(),
            ValidationError::MissingField("debateId")
        );
    }

    #[test]
    fn test_malformed_address_is_invalid() {
        let payload = FinalizedPayload {
            debate_id: Some(1.into()),
            winner: Some("0x1234".into()),
            total_votes: Some(3.into()),
            transaction_hash: Some(TX.into()),
            block_number: Some(105.into()),
        };
        assert!(matches!(
            payload.validate().unwrap_err(),
            ValidationError::InvalidField { field: "winner", .. }
        ));
    }

    #[test]
    fn test_block_number_beyond_storable_range_is_invalid() {
        let payload = JoinedPayload {
            debate_id: Some(7.into()),
            opponent: Some(OPPONENT.into()),
            transaction_hash: Some(TX.into()),
            block_number: Some("9223372036854775808".into()),
        };
        assert!(matches!(
            payload.validate().unwrap_err(),
            ValidationError::InvalidField { field: "blockNumber", .. }
        ));

        let payload = JoinedPayload {
            block_number: Some(i64::MAX as u64).map(FieldValue::from),
            ..payload
        };
        assert_eq!(payload.validate().unwrap().block_number, i64::MAX as u64);
    }

    #[test]
    fn test_on_chain_winner_alias_and_large_amount() {
        let finalized: FinalizedPayload = serde_json::from_str(&format!(
            r#"{{"debateId": 1, "onChainWinner": "{OPPONENT}", "totalVotes": 12, "transactionHash": "{TX}", "blockNumber": 105}}"#
        ))
        .unwrap();
        assert_eq!(finalized.validate().unwrap().total_votes, 12);

        let claimed: PrizeClaimedPayload = serde_json::from_str(&format!(
            r#"{{"debateId": 1, "winner": "{OPPONENT}", "amount": "2000000000000000000000", "transactionHash": "{TX}", "blockNumber": 110}}"#
        ))
        .unwrap();
        assert_eq!(
            claimed.validate().unwrap().amount,
            Amount(2_000_000_000_000_000_000_000)
        );
    }

    #[test]
    fn test_negative_block_is_invalid() {
        let payload: JoinedPayload = serde_json::from_str(&format!(
            r#"{{"debateId": 1, "opponent": "{OPPONENT}", "txHash": "{TX}", "blockNumber": "-5"}}"#
        ))
        .unwrap();
        assert!(matches!(
            payload.validate().unwrap_err(),
            ValidationError::InvalidField { field: "blockNumber", .. }
        ));
    }
}
