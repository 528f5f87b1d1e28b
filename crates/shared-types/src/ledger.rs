//! # Ledger Boundary Types
//!
//! Raw log entries as returned by the ledger client, the typed field values
//! they carry, and the decoded `LedgerEvent` produced once per log entry.
//!
//! ABI encoding internals stay behind the `LedgerClient`: a `RawLog` already
//! carries positional field values, the decoder only names and validates them.

use crate::entities::{Address, BlockNumber, Hash, LogPosition, U256};
use crate::errors::LedgerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// FIELD VALUES
// =============================================================================

/// Declared type of an event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Uint256,
    Uint8,
    Bool,
    Address,
    AddressArray,
    Bytes,
    Bytes32,
    Bytes32Array,
    String,
}

impl FieldKind {
    /// Canonical type name used in event signatures.
    pub fn abi_name(&self) -> &'static str {
        match self {
            FieldKind::Uint256 => "uint256",
            FieldKind::Uint8 => "uint8",
            FieldKind::Bool => "bool",
            FieldKind::Address => "address",
            FieldKind::AddressArray => "address[]",
            FieldKind::Bytes => "bytes",
            FieldKind::Bytes32 => "bytes32",
            FieldKind::Bytes32Array => "bytes32[]",
            FieldKind::String => "string",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abi_name())
    }
}

/// A typed event field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Uint(U256),
    Uint8(u8),
    Bool(bool),
    Address(Address),
    AddressArray(Vec<Address>),
    Bytes(Vec<u8>),
    Bytes32(Hash),
    Bytes32Array(Vec<Hash>),
    String(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Uint(_) => FieldKind::Uint256,
            FieldValue::Uint8(_) => FieldKind::Uint8,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Address(_) => FieldKind::Address,
            FieldValue::AddressArray(_) => FieldKind::AddressArray,
            FieldValue::Bytes(_) => FieldKind::Bytes,
            FieldValue::Bytes32(_) => FieldKind::Bytes32,
            FieldValue::Bytes32Array(_) => FieldKind::Bytes32Array,
            FieldValue::String(_) => FieldKind::String,
        }
    }
}

// =============================================================================
// RAW LOGS
// =============================================================================

/// A log entry as returned by `LedgerClient::get_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Emitting contract.
    pub address: Address,
    /// `topics[0]` is the event signature hash.
    pub topics: Vec<Hash>,
    /// Positional field values in declaration order.
    pub fields: Vec<FieldValue>,
    pub block_number: BlockNumber,
    pub block_hash: Hash,
    pub log_index: u32,
    /// Set by the node when the log's block was reorganized away.
    pub removed: bool,
}

impl RawLog {
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.block_number, self.log_index)
    }
}

// =============================================================================
// DECODED EVENTS
// =============================================================================

/// Ordered name → value map of a decoded event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap(Vec<(String, FieldValue)>);

impl FieldMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An immutable, named ledger event. Produced once per log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub contract: Address,
    pub name: String,
    pub block_number: BlockNumber,
    pub log_index: u32,
    pub fields: FieldMap,
}

impl LedgerEvent {
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.block_number, self.log_index)
    }
}

// =============================================================================
// LEDGER CLIENT (consumed)
// =============================================================================

/// Filter for `LedgerClient::get_logs`. Block range is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub contracts: Vec<Address>,
    pub topics: Vec<Hash>,
    pub from_block: BlockNumber,
    pub to_block: BlockNumber,
}

impl LogFilter {
    /// Whether a log falls inside this filter.
    pub fn matches(&self, log: &RawLog) -> bool {
        let in_range = log.block_number >= self.from_block && log.block_number <= self.to_block;
        let contract_ok = self.contracts.is_empty() || self.contracts.contains(&log.address);
        let topic_ok = self.topics.is_empty()
            || log
                .topics
                .first()
                .map(|t| self.topics.contains(t))
                .unwrap_or(false);
        in_range && contract_ok && topic_ok
    }
}

/// Outcome of a submitted ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Ledger RPC surface consumed by the scanner and the action submitter.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<BlockNumber, LedgerError>;

    /// Logs matching the filter, in any order.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, LedgerError>;

    /// Submit a signed transaction; returns its hash.
    async fn submit_signed_transaction(&self, bytes: Vec<u8>) -> Result<Hash, LedgerError>;

    /// Receipt status of a previously submitted transaction.
    async fn transaction_receipt(&self, hash: &Hash) -> Result<ReceiptStatus, LedgerError>;
}
