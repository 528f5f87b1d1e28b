//! Vote policy

use serde::{Deserialize, Serialize};

/// How verdicts combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DecisionRule {
    /// More than half of the chosen verifiers approve.
    #[default]
    Majority,
    /// Every chosen verifier approves.
    Unanimous,
}

/// Decision rule plus quorum and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePolicy {
    pub rule: DecisionRule,
    /// Votes required before a timed-out tally is decided on the votes cast.
    pub min_votes: usize,
    /// Blocks after transaction creation before the tally times out.
    pub vote_timeout_blocks: u64,
}

impl Default for VotePolicy {
    fn default() -> Self {
        Self {
            rule: DecisionRule::Majority,
            min_votes: 2,
            vote_timeout_blocks: 200,
        }
    }
}

impl VotePolicy {
    /// Quorum for a tally with `chosen` verifiers.
    pub fn quorum(&self, chosen: usize) -> usize {
        self.min_votes.min(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_never_exceeds_chosen() {
        let policy = VotePolicy::default();
        assert_eq!(policy.quorum(3), 2);
        assert_eq!(policy.quorum(1), 1);
        assert_eq!(policy.quorum(0), 0);
    }
}
