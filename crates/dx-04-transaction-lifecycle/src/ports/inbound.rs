//! Driving Ports (API - Inbound)

use crate::error::LifecycleResult;
use async_trait::async_trait;
use dx_07_action_submitter::Submission;
use shared_types::{Address, PublishId, TransactionId, TxState, U256};

/// Payloads of a new listing. Stored through the content store; only their
/// references go on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub price: U256,
    /// Encrypted data (sealed for the seller).
    pub metadata: Vec<u8>,
    pub description: Vec<u8>,
    /// Sample proofs a verifier may inspect.
    pub proofs: Vec<Vec<u8>>,
    pub verification_required: bool,
}

/// User actions and queries of the lifecycle engine.
///
/// Every action returns once its ledger transaction is submitted; progress
/// is reported through notifications as the ledger reacts.
#[async_trait]
pub trait LifecycleApi: Send + Sync {
    async fn publish(&self, seller: Address, request: PublishRequest)
        -> LifecycleResult<Submission>;

    /// Allow the protocol contract to move `amount` of the owner's tokens.
    async fn approve_transfer(&self, owner: Address, amount: U256) -> LifecycleResult<Submission>;

    async fn register_as_verifier(&self, verifier: Address) -> LifecycleResult<Submission>;

    /// Approve the listing price and prepare to buy once the approval is
    /// observed on the ledger.
    async fn purchase(&self, buyer: Address, publish_id: PublishId)
        -> LifecycleResult<Submission>;

    async fn prepare_to_buy(
        &self,
        buyer: Address,
        publish_id: PublishId,
    ) -> LifecycleResult<Submission>;

    async fn buy(&self, buyer: Address, tx_id: TransactionId) -> LifecycleResult<Submission>;

    async fn vote(
        &self,
        verifier: Address,
        tx_id: TransactionId,
        approve: bool,
        comment: String,
    ) -> LifecycleResult<Submission>;

    /// Submit the buyer ciphertext of a completed handoff again, after the
    /// first submission failed.
    async fn resubmit_buyer_ciphertext(
        &self,
        seller: Address,
        tx_id: TransactionId,
    ) -> LifecycleResult<Submission>;

    async fn confirm_data_truth(
        &self,
        buyer: Address,
        tx_id: TransactionId,
        truth: bool,
    ) -> LifecycleResult<Submission>;

    async fn arbitrate(
        &self,
        arbitrator: Address,
        tx_id: TransactionId,
        approve: bool,
    ) -> LifecycleResult<Submission>;

    async fn credit_verifier(
        &self,
        buyer: Address,
        tx_id: TransactionId,
        verifier: Address,
        credit: u8,
    ) -> LifecycleResult<Submission>;

    /// Description of a recorded listing, from the content store.
    async fn listing_description(&self, publish_id: &PublishId) -> LifecycleResult<Vec<u8>>;

    /// Current state of an active transaction.
    async fn state_of(&self, tx_id: &TransactionId) -> Option<TxState>;

    fn active_count(&self) -> usize;
}
