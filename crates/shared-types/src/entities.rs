//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `Address`, `Hash`
//! - **Marketplace**: `PublishId`, `TransactionId`, `Listing`
//! - **Ordering**: `LogPosition`

use crate::errors::TypeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

/// A 32-byte hash (Keccak-256 event topics, transaction hashes, content ids).
pub type Hash = [u8; 32];

/// Ledger block height.
pub type BlockNumber = u64;

// =============================================================================
// IDENTITY
// =============================================================================

/// A 20-byte ledger account address.
///
/// Displayed and serialized as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address, used for subscriptions not owned by an actor.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Parse a hex address with or without the `0x` prefix.
    pub fn from_hex(value: &str) -> Result<Self, TypeError> {
        let trimmed = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(trimmed).map_err(|e| TypeError::InvalidHex {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        let array: [u8; 20] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| TypeError::InvalidLength {
                    expected: 20,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Lowercase `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// MARKETPLACE IDENTIFIERS
// =============================================================================

/// Ledger-assigned business transaction identifier.
///
/// Unknown until the `TransactionCreate` event arrives; immutable once bound.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TransactionId(pub U256);

impl TransactionId {
    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TransactionId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for TransactionId {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

/// Identifier of a published data listing.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PublishId(pub String);

impl PublishId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PublishId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PublishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PublishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublishId({})", self.0)
    }
}

// =============================================================================
// ORDERING
// =============================================================================

/// Position of a log entry on the ledger.
///
/// Ordered by `(block_number, log_index)`, which is the delivery order of the
/// scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: BlockNumber,
    pub log_index: u32,
}

impl LogPosition {
    pub fn new(block_number: BlockNumber, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

// =============================================================================
// LISTING
// =============================================================================

/// A published data offering.
///
/// Created when a publish action confirms; referenced, never mutated, by any
/// business transaction against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub publish_id: PublishId,
    pub price: U256,
    pub seller: Address,
    /// Content id of the listing description.
    pub metadata_ref: String,
    /// Content ids of the sample proofs.
    pub proof_refs: Vec<Hash>,
    pub verification_required: bool,
    /// Block in which the publish was confirmed.
    pub published_at: BlockNumber,
}
