//! Driving Ports (API - Inbound)

use crate::domain::{Ciphertext, HandoffStatus};
use crate::error::HandoffResult;
use async_trait::async_trait;
use shared_types::{Address, TransactionId};

/// Key handoff API used by the lifecycle engine.
#[async_trait]
pub trait KeyHandoffApi: Send + Sync {
    /// Re-encrypt the seller's ciphertext for the buyer.
    ///
    /// Returns the recorded result without calling the service again when
    /// the handoff already completed.
    async fn hand_off(
        &self,
        tx_id: TransactionId,
        seller_ciphertext: Ciphertext,
        seller: Address,
        buyer: Address,
    ) -> HandoffResult<Ciphertext>;

    /// Buyer ciphertext of a completed handoff.
    fn verified_ciphertext(&self, tx_id: &TransactionId) -> Option<Ciphertext>;

    fn status(&self, tx_id: &TransactionId) -> Option<HandoffStatus>;

    /// Drop the record of a terminated transaction.
    fn forget(&self, tx_id: &TransactionId);
}
