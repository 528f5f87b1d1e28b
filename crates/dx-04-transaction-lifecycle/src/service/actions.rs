//! User actions
//!
//! Each action checks what the local state can tell, then hands a signed
//! transaction to the submitter. The ledger's reaction arrives later as an
//! event.

use super::LifecycleEngine;
use crate::domain::{MachineHandle, TransactionStateMachine};
use crate::error::{LifecycleError, LifecycleResult};
use crate::ports::inbound::{LifecycleApi, PublishRequest};
use async_trait::async_trait;
use dx_01_event_decoder::keccak256;
use dx_07_action_submitter::{Action, Submission};
use shared_types::{Address, Hash, PublishId, TransactionId, TxState, U256};
use tracing::{info, warn};

/// Highest rating a buyer may give a verifier.
pub const MAX_CREDIT: u8 = 5;

impl LifecycleEngine {
    fn active(&self, tx_id: &TransactionId) -> LifecycleResult<MachineHandle> {
        self.registry
            .get(tx_id)
            .ok_or(LifecycleError::UnknownTransaction { tx_id: *tx_id })
    }

    /// `InvalidTransition` unless the machine is in one of `states`.
    fn expect_state(
        machine: &TransactionStateMachine,
        states: &[TxState],
        action: &str,
    ) -> LifecycleResult<()> {
        if states.contains(&machine.state()) {
            return Ok(());
        }
        Err(LifecycleError::InvalidTransition {
            tx_id: machine.tx_id(),
            state: machine.state(),
            trigger: action.to_string(),
        })
    }

    fn expect_party(
        machine: &TransactionStateMachine,
        actor: Address,
        party: Address,
        action: &str,
    ) -> LifecycleResult<()> {
        if actor == party {
            return Ok(());
        }
        Err(LifecycleError::Rejected {
            tx_id: machine.tx_id(),
            trigger: action.to_string(),
            reason: format!("{} is not a party to this action", actor),
        })
    }

    async fn submit(&self, actor: Address, action: Action) -> LifecycleResult<Submission> {
        let kind = action.kind();
        let submission = self.submitter.submit(actor, action).await?;
        if submission.is_new() {
            info!(%actor, action = %kind, key = %submission.key(), "Action submitted");
        } else {
            info!(%actor, action = %kind, "Action already in flight");
        }
        Ok(submission)
    }
}

#[async_trait]
impl LifecycleApi for LifecycleEngine {
    async fn publish(
        &self,
        seller: Address,
        request: PublishRequest,
    ) -> LifecycleResult<Submission> {
        let metadata_ref = self.content.publish(&request.metadata).await?;
        let description_ref = self.content.publish(&request.description).await?;
        let mut proof_refs: Vec<Hash> = Vec::with_capacity(request.proofs.len());
        for proof in &request.proofs {
            self.content.publish(proof).await?;
            proof_refs.push(keccak256(proof));
        }

        self.submit(
            seller,
            Action::Publish {
                price: request.price,
                metadata_ref,
                proof_refs,
                description_ref,
                verification_required: request.verification_required,
            },
        )
        .await
    }

    async fn approve_transfer(&self, owner: Address, amount: U256) -> LifecycleResult<Submission> {
        self.submit(
            owner,
            Action::ApproveTransfer {
                spender: self.config.protocol_contract,
                amount,
            },
        )
        .await
    }

    async fn register_as_verifier(&self, verifier: Address) -> LifecycleResult<Submission> {
        self.submit(verifier, Action::RegisterAsVerifier).await
    }

    async fn purchase(
        &self,
        buyer: Address,
        publish_id: PublishId,
    ) -> LifecycleResult<Submission> {
        let listing = self
            .listings
            .get(&publish_id)
            .ok_or_else(|| LifecycleError::UnknownListing {
                publish_id: publish_id.clone(),
            })?;

        {
            let mut awaiting = self.awaiting_approval.lock();
            let queued = awaiting.entry(buyer).or_default();
            if queued.contains(&publish_id) || self.registry.has_pending(&buyer, &publish_id) {
                return Err(LifecycleError::AlreadyPending { buyer, publish_id });
            }
            queued.push(publish_id.clone());
            self.ensure_approval_subscription(buyer);
        }

        let approval = Action::ApproveTransfer {
            spender: self.config.protocol_contract,
            amount: listing.price,
        };
        match self.submit(buyer, approval).await {
            Ok(submission) => Ok(submission),
            Err(e) => {
                warn!(%buyer, %publish_id, error = %e, "Purchase approval failed");
                let rest: Vec<PublishId> = self
                    .take_awaiting_approval(&buyer)
                    .into_iter()
                    .filter(|queued| *queued != publish_id)
                    .collect();
                if !rest.is_empty() {
                    self.awaiting_approval.lock().insert(buyer, rest);
                    self.ensure_approval_subscription(buyer);
                }
                Err(e)
            }
        }
    }

    async fn prepare_to_buy(
        &self,
        buyer: Address,
        publish_id: PublishId,
    ) -> LifecycleResult<Submission> {
        if self.listings.get(&publish_id).is_none() {
            return Err(LifecycleError::UnknownListing { publish_id });
        }

        self.registry.add_pending(TransactionStateMachine::pending(
            publish_id.clone(),
            buyer,
            self.config.vote_policy,
            self.config.arbitrator,
        ))?;
        self.ensure_creation_subscription(buyer);

        let action = Action::PrepareToBuy {
            publish_id: publish_id.clone(),
        };
        match self.submit(buyer, action).await {
            Ok(submission) => Ok(submission),
            Err(e) => {
                self.registry.take_pending(&buyer, &publish_id);
                self.release_creation_subscription(&buyer);
                Err(e)
            }
        }
    }

    async fn buy(&self, buyer: Address, tx_id: TransactionId) -> LifecycleResult<Submission> {
        {
            let handle = self.active(&tx_id)?;
            let machine = handle.lock().await;
            Self::expect_party(&machine, buyer, machine.buyer(), "BuyData")?;
            let allowed: &[TxState] = if machine.verification_required() {
                &[TxState::Voted]
            } else {
                &[TxState::Created, TxState::Voted]
            };
            Self::expect_state(&machine, allowed, "BuyData")?;
        }
        self.submit(buyer, Action::BuyData { tx_id }).await
    }

    async fn vote(
        &self,
        verifier: Address,
        tx_id: TransactionId,
        approve: bool,
        comment: String,
    ) -> LifecycleResult<Submission> {
        // Verifiers usually vote on transactions tracked by another node.
        if let Some(handle) = self.registry.get(&tx_id) {
            let machine = handle.lock().await;
            Self::expect_state(&machine, &[TxState::Created], "Vote")?;
        }
        self.submit(
            verifier,
            Action::Vote {
                tx_id,
                approve,
                comment,
            },
        )
        .await
    }

    async fn resubmit_buyer_ciphertext(
        &self,
        seller: Address,
        tx_id: TransactionId,
    ) -> LifecycleResult<Submission> {
        let handle = self.active(&tx_id)?;
        let ciphertext = {
            let machine = handle.lock().await;
            Self::expect_state(&machine, &[TxState::Buying], "SubmitBuyerCiphertext")?;
            Self::expect_party(
                &machine,
                seller,
                machine.seller().unwrap_or(Address::ZERO),
                "SubmitBuyerCiphertext",
            )?;
            machine
                .buyer_ciphertext()
                .map(<[u8]>::to_vec)
                .ok_or_else(|| LifecycleError::UnverifiedCiphertext {
                    tx_id,
                    reason: "key handoff has not completed".to_string(),
                })?
        };
        self.submit(seller, Action::SubmitBuyerCiphertext { tx_id, ciphertext })
            .await
    }

    async fn confirm_data_truth(
        &self,
        buyer: Address,
        tx_id: TransactionId,
        truth: bool,
    ) -> LifecycleResult<Submission> {
        {
            let handle = self.active(&tx_id)?;
            let machine = handle.lock().await;
            Self::expect_party(&machine, buyer, machine.buyer(), "ConfirmDataTruth")?;
            Self::expect_state(&machine, &[TxState::ReadyForDownload], "ConfirmDataTruth")?;
        }
        self.submit(buyer, Action::ConfirmDataTruth { tx_id, truth })
            .await
    }

    async fn arbitrate(
        &self,
        arbitrator: Address,
        tx_id: TransactionId,
        approve: bool,
    ) -> LifecycleResult<Submission> {
        if let Some(expected) = self.config.arbitrator {
            if arbitrator != expected {
                return Err(LifecycleError::Rejected {
                    tx_id: Some(tx_id),
                    trigger: "Arbitrate".to_string(),
                    reason: format!("{} is not the arbitrator", arbitrator),
                });
            }
        }
        if let Some(handle) = self.registry.get(&tx_id) {
            let machine = handle.lock().await;
            Self::expect_state(&machine, &[TxState::Arbitrating], "Arbitrate")?;
        }
        self.submit(arbitrator, Action::Arbitrate { tx_id, approve })
            .await
    }

    async fn credit_verifier(
        &self,
        buyer: Address,
        tx_id: TransactionId,
        verifier: Address,
        credit: u8,
    ) -> LifecycleResult<Submission> {
        if credit > MAX_CREDIT {
            return Err(LifecycleError::Rejected {
                tx_id: Some(tx_id),
                trigger: "CreditsToVerifier".to_string(),
                reason: format!("credit {} above {}", credit, MAX_CREDIT),
            });
        }
        if let Some(handle) = self.registry.get(&tx_id) {
            let machine = handle.lock().await;
            Self::expect_party(&machine, buyer, machine.buyer(), "CreditsToVerifier")?;
            let chosen = machine
                .tally()
                .is_some_and(|tally| tally.verifiers().contains(&verifier));
            if !chosen {
                return Err(LifecycleError::Rejected {
                    tx_id: Some(tx_id),
                    trigger: "CreditsToVerifier".to_string(),
                    reason: format!("{} was not chosen for this transaction", verifier),
                });
            }
        }
        self.submit(
            buyer,
            Action::CreditsToVerifier {
                tx_id,
                verifier,
                credit,
            },
        )
        .await
    }

    async fn listing_description(&self, publish_id: &PublishId) -> LifecycleResult<Vec<u8>> {
        let listing = self
            .listings
            .get(publish_id)
            .ok_or_else(|| LifecycleError::UnknownListing {
                publish_id: publish_id.clone(),
            })?;
        Ok(self.content.fetch(&listing.metadata_ref).await?)
    }

    async fn state_of(&self, tx_id: &TransactionId) -> Option<TxState> {
        let handle = self.registry.get(tx_id)?;
        let machine = handle.lock().await;
        Some(machine.state())
    }

    fn active_count(&self) -> usize {
        self.registry.active_count()
    }
}
