//! # dx-05-verifier-coordination
//!
//! Decides whether a purchase may proceed based on the votes of the chosen
//! verifiers, and settles disputes through a single arbitrator.
//!
//! ## Overview
//!
//! ```text
//! VerifiersChosen ──→ VoteTally (≤ 3 verifiers)
//!                        │
//!                        ├── Vote ──→ record() ──→ Counted | Duplicate | NotChosen
//!                        │
//!                        └── resolve(policy, block) ──→ Approved | Rejected | TimedOut
//!
//! Rejected / TimedOut ──→ ArbitrationCase ──→ decide(arbitrator, verdict)
//! ```
//!
//! ## Rules
//!
//! - One counted vote per verifier; the first vote wins.
//! - Majority: more than half approve. Unanimous: all approve.
//! - A tally still short of `min_votes` at its deadline times out.
//! - Only the configured arbitrator may decide a case, and only once.
//!
//! Everything here is pure. The lifecycle engine owns the tallies and feeds
//! them events and block heights.

pub mod domain;
pub mod error;

pub use domain::{
    ArbitrationCase, CastVote, DecisionRule, Resolution, VoteOutcome, VotePolicy, VoteTally,
    MAX_VERIFIERS,
};
pub use error::{CoordinationError, CoordinationResult};
