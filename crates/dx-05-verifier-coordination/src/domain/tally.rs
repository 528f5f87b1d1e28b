//! Vote tally
//!
//! One tally per transaction that requires verification. Opened when the
//! transaction is created, filled when verifiers are chosen, and resolved
//! from votes and block height.
//!
//! ```text
//! [AWAITING] ──choose()──→ [CHOSEN] ──record()*──→ resolve() = Some(..)
//!      │                                               ↑
//!      └───────── deadline passed ─────────────────────┘ (TimedOut)
//! ```

use super::policy::{DecisionRule, VotePolicy};
use crate::error::{CoordinationError, CoordinationResult};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockNumber};
use tracing::debug;

/// Upper bound on chosen verifiers per transaction.
pub const MAX_VERIFIERS: usize = 3;

/// A counted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastVote {
    pub verifier: Address,
    pub approve: bool,
    pub comment: String,
}

/// Result of recording a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Counted,
    /// The verifier already voted; the earlier verdict stands.
    Duplicate,
    /// The voter is not among the chosen verifiers.
    NotChosen,
}

/// Final verdict of a tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Approved,
    Rejected,
    TimedOut,
}

/// Votes for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    chosen: bool,
    verifiers: Vec<Address>,
    votes: Vec<CastVote>,
    deadline: BlockNumber,
}

impl VoteTally {
    /// Open a tally at `opened_at`; it times out `timeout_blocks` later.
    pub fn open(opened_at: BlockNumber, timeout_blocks: u64) -> Self {
        Self {
            chosen: false,
            verifiers: Vec::new(),
            votes: Vec::new(),
            deadline: opened_at.saturating_add(timeout_blocks),
        }
    }

    /// Record the chosen verifiers. Repeated addresses count once.
    pub fn choose(&mut self, verifiers: &[Address]) -> CoordinationResult<()> {
        if self.chosen {
            return Err(CoordinationError::AlreadyChosen);
        }

        let mut unique: Vec<Address> = Vec::with_capacity(verifiers.len());
        for v in verifiers {
            if !unique.contains(v) {
                unique.push(*v);
            }
        }
        if unique.len() > MAX_VERIFIERS {
            return Err(CoordinationError::TooManyVerifiers {
                count: unique.len(),
                max: MAX_VERIFIERS,
            });
        }

        self.verifiers = unique;
        self.chosen = true;
        Ok(())
    }

    /// Record a vote. First vote wins.
    pub fn record(&mut self, verifier: Address, approve: bool, comment: impl Into<String>) -> VoteOutcome {
        if !self.verifiers.contains(&verifier) {
            debug!(%verifier, "Vote from verifier not chosen for this transaction");
            return VoteOutcome::NotChosen;
        }
        if self.votes.iter().any(|v| v.verifier == verifier) {
            debug!(%verifier, "Duplicate vote ignored");
            return VoteOutcome::Duplicate;
        }
        self.votes.push(CastVote {
            verifier,
            approve,
            comment: comment.into(),
        });
        VoteOutcome::Counted
    }

    /// Verdict at `current_block`, if one is reached.
    pub fn resolve(&self, policy: &VotePolicy, current_block: BlockNumber) -> Option<Resolution> {
        let expired = current_block >= self.deadline;

        if !self.chosen {
            return expired.then_some(Resolution::TimedOut);
        }

        let n = self.verifiers.len();
        if n == 0 {
            return Some(Resolution::TimedOut);
        }

        let approvals = self.approvals();
        let rejections = self.rejections();

        let decided = match policy.rule {
            DecisionRule::Majority => {
                if approvals * 2 > n {
                    Some(Resolution::Approved)
                } else if rejections >= n - n / 2 {
                    Some(Resolution::Rejected)
                } else {
                    None
                }
            }
            DecisionRule::Unanimous => {
                if rejections > 0 {
                    Some(Resolution::Rejected)
                } else if approvals == n {
                    Some(Resolution::Approved)
                } else {
                    None
                }
            }
        };
        if decided.is_some() || !expired {
            return decided;
        }

        if approvals + rejections < policy.quorum(n) {
            return Some(Resolution::TimedOut);
        }

        // Past the deadline with quorum: decide on the votes cast.
        let approved = match policy.rule {
            DecisionRule::Majority => approvals > rejections,
            DecisionRule::Unanimous => rejections == 0,
        };
        Some(if approved {
            Resolution::Approved
        } else {
            Resolution::Rejected
        })
    }

    pub fn is_chosen(&self) -> bool {
        self.chosen
    }

    pub fn verifiers(&self) -> &[Address] {
        &self.verifiers
    }

    pub fn votes(&self) -> &[CastVote] {
        &self.votes
    }

    pub fn deadline(&self) -> BlockNumber {
        self.deadline
    }

    pub fn approvals(&self) -> usize {
        self.votes.iter().filter(|v| v.approve).count()
    }

    pub fn rejections(&self) -> usize {
        self.votes.iter().filter(|v| !v.approve).count()
    }
}
