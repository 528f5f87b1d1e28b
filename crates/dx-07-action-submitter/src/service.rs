//! Action Submitter - Core business logic

use crate::domain::{Action, ActionKey, UnsignedTransaction};
use crate::error::{SubmissionError, SubmissionResult};
use crate::ports::inbound::ActionApi;
use crate::ports::outbound::Signer;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{
    Address, Hash, LedgerClient, LedgerError, ReceiptStatus, RetryPolicy, TransactionId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Submitter configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubmitterConfig {
    /// Budget for `Unavailable` responses from the ledger.
    pub retry: RetryPolicy,
}

/// Result of `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A new ledger transaction was accepted.
    Submitted {
        key: ActionKey,
        tx_hash: Hash,
        correlation_id: Uuid,
    },
    /// The same logical action is already in flight. `tx_hash` is `None`
    /// while the earlier submission is still being signed or sent.
    AlreadyPending { key: ActionKey, tx_hash: Option<Hash> },
}

impl Submission {
    pub fn key(&self) -> &ActionKey {
        match self {
            Submission::Submitted { key, .. } | Submission::AlreadyPending { key, .. } => key,
        }
    }

    pub fn tx_hash(&self) -> Option<Hash> {
        match self {
            Submission::Submitted { tx_hash, .. } => Some(*tx_hash),
            Submission::AlreadyPending { tx_hash, .. } => *tx_hash,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Submission::Submitted { .. })
    }
}

/// Receipt change observed by `reconcile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptUpdate {
    pub key: ActionKey,
    pub tx_hash: Hash,
    pub status: ReceiptStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    /// Key taken, transaction not yet accepted by the ledger.
    Reserved,
    /// Accepted, receipt not yet final.
    Pending { tx_hash: Hash },
    /// Receipt confirmed, awaiting the reaction event.
    Confirmed { tx_hash: Hash },
}

impl InFlight {
    fn tx_hash(&self) -> Option<Hash> {
        match self {
            InFlight::Reserved => None,
            InFlight::Pending { tx_hash } | InFlight::Confirmed { tx_hash } => Some(*tx_hash),
        }
    }
}

/// Per-actor nonce allocation. Nonces of failed submissions are handed
/// back and reused before new ones, so the sequence never gaps.
#[derive(Debug, Default)]
struct NonceBook {
    next: u64,
    returned: BTreeSet<u64>,
}

impl NonceBook {
    fn peek(&self) -> u64 {
        self.returned.first().copied().unwrap_or(self.next)
    }

    fn take(&mut self) -> u64 {
        if let Some(nonce) = self.returned.pop_first() {
            return nonce;
        }
        let nonce = self.next;
        self.next += 1;
        nonce
    }

    fn give_back(&mut self, nonce: u64) {
        if nonce.saturating_add(1) != self.next {
            self.returned.insert(nonce);
            return;
        }
        self.next = nonce;
        while let Some(below) = self.next.checked_sub(1) {
            if !self.returned.remove(&below) {
                break;
            }
            self.next = below;
        }
    }
}

#[derive(Debug, Default)]
struct SubmitterState {
    in_flight: HashMap<ActionKey, InFlight>,
    nonces: HashMap<Address, NonceBook>,
}

/// Signs and submits actions, at most one in flight per `ActionKey`.
pub struct ActionSubmitter {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn Signer>,
    config: SubmitterConfig,
    state: Mutex<SubmitterState>,
}

impl ActionSubmitter {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            ledger,
            signer,
            config,
            state: Mutex::new(SubmitterState::default()),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Nonce the next submission from `actor` will carry.
    pub fn next_nonce(&self, actor: &Address) -> u64 {
        self.state
            .lock()
            .nonces
            .get(actor)
            .map(NonceBook::peek)
            .unwrap_or(0)
    }

    /// Free the key and the nonce of a submission that never reached the
    /// ledger.
    fn release_failed(&self, key: &ActionKey, actor: Address, nonce: u64) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        state.nonces.entry(actor).or_default().give_back(nonce);
    }

    async fn sign_and_send(
        &self,
        actor: Address,
        unsigned: UnsignedTransaction,
    ) -> SubmissionResult<Hash> {
        let message = unsigned.signing_bytes()?;
        let signature = self
            .signer
            .sign(actor, &message)
            .await
            .map_err(|e| SubmissionError::SigningFailed {
                actor,
                reason: e.to_string(),
            })?;
        let bytes = unsigned.into_signed(signature).encode()?;

        self.config
            .retry
            .run(
                || self.ledger.submit_signed_transaction(bytes.clone()),
                LedgerError::is_transient,
            )
            .await
            .map_err(|exhausted| match exhausted.error {
                LedgerError::Unavailable(reason) => SubmissionError::Unavailable {
                    attempts: exhausted.attempts,
                    reason,
                },
                LedgerError::InsufficientBalance { .. } => {
                    SubmissionError::InsufficientBalance { actor }
                }
                LedgerError::Rejected(reason) | LedgerError::NotFound(reason) => {
                    SubmissionError::Rejected { reason }
                }
            })
    }
}

#[async_trait]
impl ActionApi for ActionSubmitter {
    async fn submit(&self, actor: Address, action: Action) -> SubmissionResult<Submission> {
        let key = action.key(actor);
        let nonce = {
            let mut state = self.state.lock();
            if let Some(entry) = state.in_flight.get(&key) {
                debug!(%key, "Action already in flight");
                return Ok(Submission::AlreadyPending {
                    tx_hash: entry.tx_hash(),
                    key,
                });
            }
            state.in_flight.insert(key.clone(), InFlight::Reserved);
            state.nonces.entry(actor).or_default().take()
        };

        let correlation_id = Uuid::new_v4();
        let unsigned = UnsignedTransaction {
            correlation_id,
            from: actor,
            nonce,
            action,
        };

        match self.sign_and_send(actor, unsigned).await {
            Ok(tx_hash) => {
                let mut state = self.state.lock();
                if state.in_flight.contains_key(&key) {
                    state.in_flight.insert(key.clone(), InFlight::Pending { tx_hash });
                }
                info!(
                    %key,
                    nonce,
                    %correlation_id,
                    tx_hash = %hex::encode(tx_hash),
                    "Action submitted"
                );
                Ok(Submission::Submitted {
                    key,
                    tx_hash,
                    correlation_id,
                })
            }
            Err(e) => {
                self.release_failed(&key, actor, nonce);
                warn!(%key, nonce, %correlation_id, error = %e, "Action submission failed");
                Err(e)
            }
        }
    }

    fn confirm(&self, key: &ActionKey) -> bool {
        let released = self.state.lock().in_flight.remove(key).is_some();
        if released {
            debug!(%key, "Action reaction observed");
        }
        released
    }

    fn release_transaction(&self, tx_id: &TransactionId) {
        let mut state = self.state.lock();
        let before = state.in_flight.len();
        state
            .in_flight
            .retain(|key, _| key.transaction_id().as_ref() != Some(tx_id));
        let released = before - state.in_flight.len();
        if released > 0 {
            debug!(%tx_id, released, "Released in-flight actions of closed transaction");
        }
    }

    fn is_in_flight(&self, key: &ActionKey) -> bool {
        self.state.lock().in_flight.contains_key(key)
    }

    /// Failed submissions are released so the action can be retried;
    /// confirmed ones stay in flight until `confirm`, unless no reaction
    /// event is expected for them.
    async fn reconcile(&self) -> Vec<ReceiptUpdate> {
        let pending: Vec<(ActionKey, Hash)> = self
            .state
            .lock()
            .in_flight
            .iter()
            .filter_map(|(key, entry)| match entry {
                InFlight::Pending { tx_hash } => Some((key.clone(), *tx_hash)),
                _ => None,
            })
            .collect();

        let mut updates = Vec::new();
        for (key, tx_hash) in pending {
            let status = match self.ledger.transaction_receipt(&tx_hash).await {
                Ok(status) => status,
                Err(e) => {
                    debug!(%key, error = %e, "Receipt not available yet");
                    continue;
                }
            };

            let mut state = self.state.lock();
            // The entry may have been confirmed or released while polling.
            if state.in_flight.get(&key) != Some(&InFlight::Pending { tx_hash }) {
                continue;
            }
            match status {
                ReceiptStatus::Pending => continue,
                ReceiptStatus::Confirmed if !key.kind.expects_reaction() => {
                    state.in_flight.remove(&key);
                }
                ReceiptStatus::Confirmed => {
                    state.in_flight.insert(key.clone(), InFlight::Confirmed { tx_hash });
                }
                ReceiptStatus::Failed => {
                    state.in_flight.remove(&key);
                    warn!(%key, "Submitted transaction failed on the ledger; action released");
                }
            }
            updates.push(ReceiptUpdate {
                key,
                tx_hash,
                status,
            });
        }
        updates
    }
}
