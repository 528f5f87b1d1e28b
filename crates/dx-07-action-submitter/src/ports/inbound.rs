//! Driving Ports (API - Inbound)

use crate::domain::{Action, ActionKey};
use crate::error::SubmissionResult;
use crate::service::{ReceiptUpdate, Submission};
use async_trait::async_trait;
use shared_types::{Address, TransactionId};

/// Outbound action API used by the lifecycle engine.
#[async_trait]
pub trait ActionApi: Send + Sync {
    /// Sign and submit `action` for `actor`, unless the same logical action
    /// is already in flight.
    async fn submit(&self, actor: Address, action: Action) -> SubmissionResult<Submission>;

    /// The reaction to `key` was observed on the ledger. Returns whether an
    /// entry was released.
    fn confirm(&self, key: &ActionKey) -> bool;

    /// Release every in-flight action scoped to a terminated transaction.
    fn release_transaction(&self, tx_id: &TransactionId);

    fn is_in_flight(&self, key: &ActionKey) -> bool;

    /// Poll receipts of submissions still awaiting one.
    async fn reconcile(&self) -> Vec<ReceiptUpdate>;
}
