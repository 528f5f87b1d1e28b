//! # Notifications
//!
//! The structured records emitted by the lifecycle engine. The envelope is
//! `{transactionId, publishId, fromState, toState, blockNumber, payload}`.

use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockNumber, PublishId, TransactionId, TxState};

/// One structured notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub transaction_id: Option<TransactionId>,
    pub publish_id: Option<PublishId>,
    pub from_state: Option<TxState>,
    pub to_state: Option<TxState>,
    pub block_number: Option<BlockNumber>,
    pub payload: NotificationPayload,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NotificationPayload {
    /// A state transition was applied.
    Transition {
        /// Event or internal trigger that caused it.
        trigger: String,
        detail: Option<String>,
    },

    /// An event was dropped.
    Anomaly {
        anomaly: AnomalyKind,
        event: String,
        detail: String,
    },

    /// The transaction terminated in failure. Addressed to every listed party.
    Failure {
        reason: String,
        parties: Vec<Address>,
    },

    /// A listing was published.
    ListingPublished { seller: Address, price: String },

    /// An outbound action could not be submitted. The transaction state is
    /// unchanged and the action may be retried.
    SubmissionFailed { action: String, detail: String },

    /// An actor-level ledger event not tied to a transaction.
    ActorEvent { actor: Address, event: String },
}

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Log could not be decoded.
    DecodeFailure,
    /// Event names a transaction not in the active set.
    UnknownTransaction,
    /// Event is not valid from the transaction's current state.
    InvalidTransition,
    /// A handler failed while processing the event.
    HandlerFailure,
}

/// Coarse category used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Transition,
    Anomaly,
    Failure,
    Listing,
    Submission,
    Actor,
}

impl Notification {
    /// A transition notification.
    pub fn transition(
        transaction_id: TransactionId,
        publish_id: PublishId,
        from: TxState,
        to: TxState,
        block_number: BlockNumber,
        trigger: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            publish_id: Some(publish_id),
            from_state: Some(from),
            to_state: Some(to),
            block_number: Some(block_number),
            payload: NotificationPayload::Transition {
                trigger: trigger.into(),
                detail,
            },
        }
    }

    /// An anomaly notification for a dropped event.
    pub fn anomaly(
        transaction_id: Option<TransactionId>,
        block_number: Option<BlockNumber>,
        anomaly: AnomalyKind,
        event: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            publish_id: None,
            from_state: None,
            to_state: None,
            block_number,
            payload: NotificationPayload::Anomaly {
                anomaly,
                event: event.into(),
                detail: detail.into(),
            },
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self.payload {
            NotificationPayload::Transition { .. } => NotificationKind::Transition,
            NotificationPayload::Anomaly { .. } => NotificationKind::Anomaly,
            NotificationPayload::Failure { .. } => NotificationKind::Failure,
            NotificationPayload::ListingPublished { .. } => NotificationKind::Listing,
            NotificationPayload::SubmissionFailed { .. } => NotificationKind::Submission,
            NotificationPayload::ActorEvent { .. } => NotificationKind::Actor,
        }
    }

    /// Whether this is a transition into `state`.
    pub fn is_transition_to(&self, state: TxState) -> bool {
        self.kind() == NotificationKind::Transition && self.to_state == Some(state)
    }
}

/// Filter for notification subscriptions. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub kinds: Vec<NotificationKind>,
    pub transactions: Vec<TransactionId>,
}

impl NotificationFilter {
    /// Match every notification.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match only the given kinds.
    pub fn kinds(kinds: Vec<NotificationKind>) -> Self {
        Self {
            kinds,
            transactions: Vec::new(),
        }
    }

    /// Match only notifications about one transaction.
    pub fn transaction(transaction_id: TransactionId) -> Self {
        Self {
            kinds: Vec::new(),
            transactions: vec![transaction_id],
        }
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        let kind_ok = self.kinds.is_empty() || self.kinds.contains(&notification.kind());
        let tx_ok = self.transactions.is_empty()
            || notification
                .transaction_id
                .map(|id| self.transactions.contains(&id))
                .unwrap_or(false);
        kind_ok && tx_ok
    }
}
