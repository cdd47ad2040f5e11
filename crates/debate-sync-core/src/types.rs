//! Strong type definitions for ledger identifiers.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Byte
//! identifiers render as `0x`-prefixed lowercase hex, which is also their
//! serde representation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// On-chain debate index, assigned by the contract at creation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebateId(pub u64);

impl DebateId {
    /// Create a debate id from its on-chain index.
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// The raw on-chain index.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for DebateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DebateId({})", self.0)
    }
}

impl fmt::Display for DebateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DebateId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Error parsing a hex identifier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HexIdError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}

/// Decode `0x`-prefixed (or bare) hex into a fixed-size array.
fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], HexIdError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(digits)?;
    if bytes.len() != N {
        return Err(HexIdError::Length {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Byte length of this identifier.
            pub const LEN: usize = $len;

            /// The all-zero value (sentinel).
            pub const ZERO: Self = Self([0u8; $len]);

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Convert to `0x`-prefixed lowercase hex.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Parse from hex, with or without the `0x` prefix.
            pub fn from_hex(s: &str) -> Result<Self, HexIdError> {
                decode_fixed::<$len>(s.trim()).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let hex = hex::encode(self.0);
                write!(f, concat!(stringify!($name), "(0x{}…)"), &hex[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = HexIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// A 20-byte account address (participant, winner, contract).
    Address,
    20
);

hex_id!(
    /// A 32-byte ledger transaction hash.
    TxHash,
    32
);

/// A token amount in base units.
///
/// Serialized as a decimal string so JSON consumers never lose precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(pub u128);

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_accepts_prefix_and_case() {
        let addr = Address::from_bytes([0xab; 20]);
        let hex = addr.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(Address::from_hex(&hex).unwrap(), addr);
        assert_eq!(Address::from_hex(&hex.to_uppercase().replacen("0X", "0x", 1)).unwrap(), addr);
        assert_eq!(Address::from_hex(&hex[2..]).unwrap(), addr);
    }

    #[test]
    fn test_tx_hash_rejects_wrong_length() {
        let err = TxHash::from_hex("0xdeadbeef").unwrap_err();
        assert_eq!(err, HexIdError::Length { expected: 32, got: 4 });
    }

    #[test]
    fn test_address_rejects_non_hex_digits() {
        let err = Address::from_hex(&format!("0x{}", "zz".repeat(20))).unwrap_err();
        assert!(matches!(err, HexIdError::Hex(_)));
        assert!(err.to_string().starts_with("invalid hex"));
    }

    #[test]
    fn test_debug_is_truncated() {
        let tx = TxHash::from_bytes([0xcd; 32]);
        assert_eq!(format!("{:?}", tx), "TxHash(0xcdcdcdcd…)");
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let amount = Amount(u128::MAX);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_address_serde_is_hex_string() {
        let addr = Address::from_bytes([0x01; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0x0101010101010101010101010101010101010101\"");
    }
}
