//! Handoff records

use super::ciphertext::Ciphertext;
use serde::{Deserialize, Serialize};
use shared_types::{Address, TransactionId};

/// Progress of one handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoffStatus {
    /// Re-encryption requested, not yet answered.
    Pending { attempts: u32 },
    /// Key is sealed for the buyer.
    Complete { buyer_ciphertext: Ciphertext },
    /// Fail-stop; the transaction will not reach the buyer.
    Failed { reason: String },
}

impl HandoffStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, HandoffStatus::Complete { .. })
    }
}

/// Handoff state for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub tx_id: TransactionId,
    pub seller: Address,
    pub buyer: Address,
    pub status: HandoffStatus,
}

impl HandoffRecord {
    pub fn pending(tx_id: TransactionId, seller: Address, buyer: Address) -> Self {
        Self {
            tx_id,
            seller,
            buyer,
            status: HandoffStatus::Pending { attempts: 0 },
        }
    }

    /// The buyer ciphertext, once complete.
    pub fn verified_ciphertext(&self) -> Option<&Ciphertext> {
        match &self.status {
            HandoffStatus::Complete { buyer_ciphertext } => Some(buyer_ciphertext),
            _ => None,
        }
    }
}
