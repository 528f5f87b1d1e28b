//! Error types for Verifier Coordination

use shared_types::Address;
use thiserror::Error;

/// Verifier coordination errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinationError {
    /// More verifiers chosen than a tally can hold
    #[error("Too many verifiers chosen: {count} (max {max})")]
    TooManyVerifiers { count: usize, max: usize },

    /// Verifiers were already chosen for this tally
    #[error("Verifiers already chosen")]
    AlreadyChosen,

    /// Arbitration decided by someone other than the configured arbitrator
    #[error("Unauthorized arbitrator: {actor}")]
    UnauthorizedArbitrator { actor: Address },

    /// Arbitration case already has a decision
    #[error("Arbitration already decided")]
    AlreadyDecided,
}

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;
