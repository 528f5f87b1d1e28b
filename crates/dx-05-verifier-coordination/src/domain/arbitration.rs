//! Arbitration
//!
//! Opened when votes reject or time out, or when the buyer disputes the
//! delivered data. The arbitrator's first decision is final.

use crate::error::{CoordinationError, CoordinationResult};
use serde::{Deserialize, Serialize};
use shared_types::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArbitrationCase {
    /// Only this address may decide. `None` accepts any arbitrator.
    arbitrator: Option<Address>,
    decision: Option<(Address, bool)>,
}

impl ArbitrationCase {
    pub fn open(arbitrator: Option<Address>) -> Self {
        Self {
            arbitrator,
            decision: None,
        }
    }

    /// Record `actor`'s verdict. `true` releases payment to the seller.
    pub fn decide(&mut self, actor: Address, approve: bool) -> CoordinationResult<bool> {
        if let Some(expected) = self.arbitrator {
            if expected != actor {
                return Err(CoordinationError::UnauthorizedArbitrator { actor });
            }
        }
        if self.decision.is_some() {
            return Err(CoordinationError::AlreadyDecided);
        }
        self.decision = Some((actor, approve));
        Ok(approve)
    }

    pub fn decision(&self) -> Option<bool> {
        self.decision.map(|(_, approve)| approve)
    }

    pub fn decided_by(&self) -> Option<Address> {
        self.decision.map(|(actor, _)| actor)
    }

    pub fn arbitrator(&self) -> Option<Address> {
        self.arbitrator
    }
}
