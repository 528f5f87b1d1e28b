//! Domain module for Verifier Coordination
//!
//! - policy: decision rule, quorum and timeout
//! - tally: per-transaction vote record
//! - arbitration: single-arbitrator dispute resolution

pub mod arbitration;
pub mod policy;
pub mod tally;

pub use arbitration::ArbitrationCase;
pub use policy::{DecisionRule, VotePolicy};
pub use tally::{CastVote, Resolution, VoteOutcome, VoteTally, MAX_VERIFIERS};
