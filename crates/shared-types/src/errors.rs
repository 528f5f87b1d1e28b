//! # Error Types
//!
//! Errors shared across subsystems: primitive parsing and the ledger client
//! boundary.

use thiserror::Error;

/// Errors parsing shared primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Input was not valid hex.
    #[error("Invalid hex '{value}': {reason}")]
    InvalidHex { value: String, reason: String },

    /// Decoded bytes had the wrong length.
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Errors reported by the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// RPC endpoint unreachable or timed out. Retryable.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// The node rejected the request (bad nonce, reverted call, ...).
    #[error("Ledger rejected request: {0}")]
    Rejected(String),

    /// The sending account cannot pay for the transaction.
    #[error("Insufficient balance for {account}")]
    InsufficientBalance { account: String },

    /// Requested item (receipt, block) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl LedgerError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(LedgerError::Unavailable("timeout".into()).is_transient());
        assert!(!LedgerError::Rejected("revert".into()).is_transient());
        assert!(!LedgerError::InsufficientBalance {
            account: "0x00".into()
        }
        .is_transient());
    }
}
