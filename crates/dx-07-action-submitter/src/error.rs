//! Error types for Action Submitter

use shared_types::Address;
use thiserror::Error;

/// Error returned by a `Signer`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SignerError(pub String);

/// Submission errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    /// The signer refused or failed
    #[error("Signing failed for {actor}: {reason}")]
    SigningFailed { actor: Address, reason: String },

    /// Account cannot pay for the transaction
    #[error("Insufficient balance for {actor}")]
    InsufficientBalance { actor: Address },

    /// Ledger rejected the transaction
    #[error("Transaction rejected: {reason}")]
    Rejected { reason: String },

    /// Ledger unreachable within the retry budget
    #[error("Ledger unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { attempts: u32, reason: String },

    /// Envelope could not be serialized
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// Result type for submission operations
pub type SubmissionResult<T> = Result<T, SubmissionError>;
