//! Error types for Key Handoff

use shared_types::TransactionId;
use thiserror::Error;

/// Errors reported by the re-encryption service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyServiceError {
    /// Service unreachable. Retryable.
    #[error("Key service unavailable: {0}")]
    Unavailable(String),

    /// Service refused to re-encrypt for this pair of parties.
    #[error("Re-encryption denied: {0}")]
    Denied(String),

    /// Input or output ciphertext is not well formed.
    #[error("Malformed ciphertext: {0}")]
    Malformed(String),
}

impl KeyServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, KeyServiceError::Unavailable(_))
    }
}

/// Handoff errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandoffError {
    /// The handoff failed permanently; the transaction cannot complete.
    #[error("Key handoff failed for transaction {tx_id}: {reason}")]
    HandoffFailed { tx_id: TransactionId, reason: String },
}

/// Result type for handoff operations
pub type HandoffResult<T> = Result<T, HandoffError>;
