//! Signed transaction envelope
//!
//! The signer signs `bincode(UnsignedTransaction)`; the ledger receives
//! `bincode(SignedTransaction)`.

use super::action::Action;
use crate::error::{SubmissionError, SubmissionResult};
use serde::{Deserialize, Serialize};
use shared_types::Address;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Correlates log lines and receipts with this submission.
    pub correlation_id: Uuid,
    pub from: Address,
    pub nonce: u64,
    pub action: Action,
}

impl UnsignedTransaction {
    /// Bytes handed to the signer.
    pub fn signing_bytes(&self) -> SubmissionResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SubmissionError::Encoding(e.to_string()))
    }

    pub fn into_signed(self, signature: Vec<u8>) -> SignedTransaction {
        SignedTransaction {
            transaction: self,
            signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: UnsignedTransaction,
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    /// Wire bytes for `LedgerClient::submit_signed_transaction`.
    pub fn encode(&self) -> SubmissionResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SubmissionError::Encoding(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> SubmissionResult<Self> {
        bincode::deserialize(bytes).map_err(|e| SubmissionError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::TransactionId;

    #[test]
    fn test_envelope_decodes_what_was_encoded() {
        let unsigned = UnsignedTransaction {
            correlation_id: Uuid::new_v4(),
            from: Address([4; 20]),
            nonce: 9,
            action: Action::ConfirmDataTruth {
                tx_id: TransactionId::from(3),
                truth: true,
            },
        };
        let signed = unsigned.clone().into_signed(vec![1, 2, 3]);

        let decoded = SignedTransaction::decode(&signed.encode().unwrap()).unwrap();
        assert_eq!(decoded.transaction, unsigned);
        assert_eq!(decoded.signature, vec![1, 2, 3]);
    }
}
