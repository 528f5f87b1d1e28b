//! Error types for the Transaction Lifecycle

use dx_06_key_handoff::HandoffError;
use dx_07_action_submitter::SubmissionError;
use shared_types::{Address, PublishId, TransactionId, TxState};
use thiserror::Error;

/// Content store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Content store unavailable: {0}")]
    Unavailable(String),
}

/// Lifecycle errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Event or action names a transaction outside the active set
    #[error("Unknown transaction {tx_id}")]
    UnknownTransaction { tx_id: TransactionId },

    /// Trigger not valid from the current state
    #[error("Invalid transition for {tx_id:?}: {trigger} in state {state}")]
    InvalidTransition {
        tx_id: Option<TransactionId>,
        state: TxState,
        trigger: String,
    },

    /// On-chain buyer ciphertext missing from or different to the verified one
    #[error("Unverified buyer ciphertext for {tx_id}: {reason}")]
    UnverifiedCiphertext { tx_id: TransactionId, reason: String },

    /// A guard on the event's actor failed
    #[error("Rejected {trigger} for {tx_id:?}: {reason}")]
    Rejected {
        tx_id: Option<TransactionId>,
        trigger: String,
        reason: String,
    },

    #[error("Unknown listing {publish_id}")]
    UnknownListing { publish_id: PublishId },

    #[error("Transaction {tx_id} is already bound")]
    AlreadyBound { tx_id: TransactionId },

    #[error("Purchase of {publish_id} by {buyer} is already pending")]
    AlreadyPending { buyer: Address, publish_id: PublishId },

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Content(#[from] ContentError),

    /// Persisted snapshot written by an incompatible version
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    IncompatibleSnapshot { found: u32, expected: u32 },

    /// The engine was dropped while a handler still ran
    #[error("Lifecycle engine shut down")]
    ShutDown,
}

impl LifecycleError {
    /// Whether the error describes a dropped event rather than a failure.
    pub fn is_rejected_event(&self) -> bool {
        matches!(
            self,
            LifecycleError::UnknownTransaction { .. }
                | LifecycleError::InvalidTransition { .. }
                | LifecycleError::UnverifiedCiphertext { .. }
                | LifecycleError::Rejected { .. }
        )
    }
}

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;
