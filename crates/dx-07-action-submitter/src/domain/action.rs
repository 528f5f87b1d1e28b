//! User actions
//!
//! Each action becomes one ledger transaction against the protocol or token
//! contract.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Hash, PublishId, TransactionId, U256};
use std::fmt;

/// An outbound action with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Offer data for sale.
    Publish {
        price: U256,
        metadata_ref: String,
        proof_refs: Vec<Hash>,
        description_ref: String,
        verification_required: bool,
    },
    /// Allow `spender` to move `amount` tokens (the protocol contract, for
    /// purchases and verifier deposits).
    ApproveTransfer { spender: Address, amount: U256 },
    RegisterAsVerifier,
    /// Open a business transaction against a listing.
    PrepareToBuy { publish_id: PublishId },
    /// Pay for the data (after verification, if any).
    BuyData { tx_id: TransactionId },
    Vote {
        tx_id: TransactionId,
        approve: bool,
        comment: String,
    },
    /// Seller puts the key re-sealed for the buyer on chain.
    SubmitBuyerCiphertext {
        tx_id: TransactionId,
        ciphertext: Vec<u8>,
    },
    /// Buyer confirms whether the data matches its description.
    ConfirmDataTruth { tx_id: TransactionId, truth: bool },
    Arbitrate { tx_id: TransactionId, approve: bool },
    /// Buyer rates a verifier.
    CreditsToVerifier {
        tx_id: TransactionId,
        verifier: Address,
        credit: u8,
    },
}

/// Action discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Publish,
    ApproveTransfer,
    RegisterAsVerifier,
    PrepareToBuy,
    BuyData,
    Vote,
    SubmitBuyerCiphertext,
    ConfirmDataTruth,
    Arbitrate,
    CreditsToVerifier,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Publish => "Publish",
            ActionKind::ApproveTransfer => "ApproveTransfer",
            ActionKind::RegisterAsVerifier => "RegisterAsVerifier",
            ActionKind::PrepareToBuy => "PrepareToBuy",
            ActionKind::BuyData => "BuyData",
            ActionKind::Vote => "Vote",
            ActionKind::SubmitBuyerCiphertext => "SubmitBuyerCiphertext",
            ActionKind::ConfirmDataTruth => "ConfirmDataTruth",
            ActionKind::Arbitrate => "Arbitrate",
            ActionKind::CreditsToVerifier => "CreditsToVerifier",
        }
    }

    /// Whether the ledger answers this action with an event the engine
    /// waits for. Actions without one are settled by their receipt.
    pub fn expects_reaction(&self) -> bool {
        !matches!(self, ActionKind::CreditsToVerifier)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business scope an action applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionScope {
    /// Whole account (approvals, verifier registration).
    Account,
    /// One listing.
    Listing(PublishId),
    /// One listing description, before it has a publish id.
    Content(String),
    /// One business transaction.
    Transaction(TransactionId),
    /// One counterparty within a business transaction.
    Party(TransactionId, Address),
}

/// Identifies a logical action for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub actor: Address,
    pub kind: ActionKind,
    pub scope: ActionScope,
}

impl ActionKey {
    pub fn new(actor: Address, kind: ActionKind, scope: ActionScope) -> Self {
        Self { actor, kind, scope }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match &self.scope {
            ActionScope::Transaction(tx) | ActionScope::Party(tx, _) => Some(*tx),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{:?}", self.actor, self.kind, self.scope)
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Publish { .. } => ActionKind::Publish,
            Action::ApproveTransfer { .. } => ActionKind::ApproveTransfer,
            Action::RegisterAsVerifier => ActionKind::RegisterAsVerifier,
            Action::PrepareToBuy { .. } => ActionKind::PrepareToBuy,
            Action::BuyData { .. } => ActionKind::BuyData,
            Action::Vote { .. } => ActionKind::Vote,
            Action::SubmitBuyerCiphertext { .. } => ActionKind::SubmitBuyerCiphertext,
            Action::ConfirmDataTruth { .. } => ActionKind::ConfirmDataTruth,
            Action::Arbitrate { .. } => ActionKind::Arbitrate,
            Action::CreditsToVerifier { .. } => ActionKind::CreditsToVerifier,
        }
    }

    pub fn scope(&self) -> ActionScope {
        match self {
            Action::Publish {
                description_ref, ..
            } => ActionScope::Content(description_ref.clone()),
            Action::ApproveTransfer { .. } | Action::RegisterAsVerifier => ActionScope::Account,
            Action::PrepareToBuy { publish_id } => ActionScope::Listing(publish_id.clone()),
            Action::CreditsToVerifier {
                tx_id, verifier, ..
            } => ActionScope::Party(*tx_id, *verifier),
            Action::BuyData { tx_id }
            | Action::Vote { tx_id, .. }
            | Action::SubmitBuyerCiphertext { tx_id, .. }
            | Action::ConfirmDataTruth { tx_id, .. }
            | Action::Arbitrate { tx_id, .. } => ActionScope::Transaction(*tx_id),
        }
    }

    /// Deduplication key of this action when taken by `actor`.
    pub fn key(&self, actor: Address) -> ActionKey {
        ActionKey::new(actor, self.kind(), self.scope())
    }
}
