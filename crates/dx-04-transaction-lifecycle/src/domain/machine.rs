//! Transaction state machine
//!
//! One machine per business transaction. Pure: it consumes triggers and
//! returns the effects the engine must carry out, never performing I/O.
//!
//! ```text
//! Pending ──Created──→ Created ──votes approve──→ Voted ──Buy──→ Buying
//!                        │  └──────── Buy (no verification) ──────↑ │
//!                        │                                          ├─ handoff complete: submit buyer ciphertext
//!                        └──votes reject / time out──→ Arbitrating  ├─ handoff failed ──→ Failed
//!                                                       ↑   │       │
//!                             DataConfirmed(false) ─────┘   │   ReadyForDownload ──DataConfirmed(true)──→ Payed ──Close──→ Closed
//!                                                           ├──approve──→ Payed
//!                                                           └──reject───→ Closed
//! ```

use crate::error::{LifecycleError, LifecycleResult};
use dx_01_event_decoder::MarketEvent;
use dx_05_verifier_coordination::{
    ArbitrationCase, CoordinationError, Resolution, VoteOutcome, VotePolicy, VoteTally,
};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockNumber, Hash, LogPosition, PublishId, TransactionId, TxState};
use tracing::{debug, warn};

/// Input to a state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Created {
        tx_id: TransactionId,
        seller: Address,
        proof_refs: Vec<Hash>,
        verification_required: bool,
    },
    VerifiersChosen {
        verifiers: Vec<Address>,
    },
    Vote {
        verifier: Address,
        approve: bool,
        comment: String,
    },
    /// Block height advanced; drives vote timeouts.
    Tick,
    BuyConfirmed {
        buyer: Address,
        seller_ciphertext: Vec<u8>,
    },
    HandoffComplete {
        buyer_ciphertext: Vec<u8>,
    },
    HandoffFailed {
        reason: String,
    },
    ReadyForDownload {
        buyer_ciphertext: Vec<u8>,
    },
    DataConfirmed {
        truth: bool,
    },
    ArbitrationResult {
        arbitrator: Address,
        approve: bool,
    },
    Close,
    VerifierDisabled {
        verifier: Address,
    },
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Created { .. } => "TransactionCreate",
            Trigger::VerifiersChosen { .. } => "VerifiersChosen",
            Trigger::Vote { .. } => "Vote",
            Trigger::Tick => "Tick",
            Trigger::BuyConfirmed { .. } => "Buy",
            Trigger::HandoffComplete { .. } => "HandoffComplete",
            Trigger::HandoffFailed { .. } => "HandoffFailed",
            Trigger::ReadyForDownload { .. } => "ReadyForDownload",
            Trigger::DataConfirmed { .. } => "DataConfirmed",
            Trigger::ArbitrationResult { .. } => "ArbitrationResult",
            Trigger::Close => "TransactionClose",
            Trigger::VerifierDisabled { .. } => "VerifierDisable",
        }
    }

    /// Trigger carried by a ledger event, if the event drives a machine.
    pub fn from_event(event: &MarketEvent) -> Option<Self> {
        let trigger = match event {
            MarketEvent::TransactionCreate {
                tx_id,
                seller,
                proof_refs,
                verification_required,
                ..
            } => Trigger::Created {
                tx_id: *tx_id,
                seller: *seller,
                proof_refs: proof_refs.clone(),
                verification_required: *verification_required,
            },
            MarketEvent::VerifiersChosen { verifiers, .. } => Trigger::VerifiersChosen {
                verifiers: verifiers.clone(),
            },
            MarketEvent::Vote {
                verifier,
                approve,
                comment,
                ..
            } => Trigger::Vote {
                verifier: *verifier,
                approve: *approve,
                comment: comment.clone(),
            },
            MarketEvent::Buy {
                buyer,
                seller_ciphertext,
                ..
            } => Trigger::BuyConfirmed {
                buyer: *buyer,
                seller_ciphertext: seller_ciphertext.clone(),
            },
            MarketEvent::ReadyForDownload {
                buyer_ciphertext, ..
            } => Trigger::ReadyForDownload {
                buyer_ciphertext: buyer_ciphertext.clone(),
            },
            MarketEvent::DataConfirmed { truth, .. } => Trigger::DataConfirmed { truth: *truth },
            MarketEvent::ArbitrationResult {
                arbitrator,
                approve,
                ..
            } => Trigger::ArbitrationResult {
                arbitrator: *arbitrator,
                approve: *approve,
            },
            MarketEvent::TransactionClose { .. } => Trigger::Close,
            MarketEvent::VerifierDisable { verifier, .. } => Trigger::VerifierDisabled {
                verifier: *verifier,
            },
            MarketEvent::DataPublish { .. }
            | MarketEvent::Approval { .. }
            | MarketEvent::RegisterVerifier { .. } => return None,
        };
        Some(trigger)
    }
}

/// Where a trigger comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// A ledger event at this position.
    Log(LogPosition),
    /// A block height tick.
    Block(BlockNumber),
    /// An internal outcome (key handoff).
    Internal,
}

impl Stamp {
    fn block(&self) -> Option<BlockNumber> {
        match self {
            Stamp::Log(position) => Some(position.block_number),
            Stamp::Block(block) => Some(*block),
            Stamp::Internal => None,
        }
    }
}

/// Work the engine carries out for a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The ledger assigned the id; register the machine as active.
    Bind(TransactionId),
    /// Verifiers are being chosen on the ledger.
    AwaitVerification,
    /// No verification; the buyer may buy right away.
    AwaitBuy,
    OpenArbitration { reason: String },
    RequestHandoff {
        seller_ciphertext: Vec<u8>,
        seller: Address,
        buyer: Address,
    },
    SubmitBuyerCiphertext { ciphertext: Vec<u8> },
    NotifyBuyer,
    ReleasePayment,
    Refund,
    /// Terminal state reached. `failure` is set for `Failed`.
    Terminate { failure: Option<String> },
}

impl Effect {
    /// Short description used in notification details.
    pub fn describe(&self) -> String {
        match self {
            Effect::Bind(tx_id) => format!("bound id {}", tx_id),
            Effect::AwaitVerification => "awaiting verification".to_string(),
            Effect::AwaitBuy => "awaiting buy".to_string(),
            Effect::OpenArbitration { reason } => format!("arbitration opened: {}", reason),
            Effect::RequestHandoff { .. } => "key handoff requested".to_string(),
            Effect::SubmitBuyerCiphertext { .. } => "buyer ciphertext submitted".to_string(),
            Effect::NotifyBuyer => "data ready for download".to_string(),
            Effect::ReleasePayment => "payment released".to_string(),
            Effect::Refund => "buyer refunded".to_string(),
            Effect::Terminate { failure: Some(reason) } => format!("failed: {}", reason),
            Effect::Terminate { failure: None } => "closed".to_string(),
        }
    }
}

/// A state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: TxState,
    pub to: TxState,
    pub trigger: &'static str,
    pub block: BlockNumber,
    pub effects: Vec<Effect>,
}

/// Outcome of `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Transitioned(Transition),
    /// Accepted without a state change.
    Absorbed { effects: Vec<Effect> },
    /// Already applied; ignored.
    Duplicate,
}

impl Applied {
    fn absorbed() -> Self {
        Applied::Absorbed {
            effects: Vec::new(),
        }
    }
}

/// State of one business transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStateMachine {
    tx_id: Option<TransactionId>,
    publish_id: PublishId,
    buyer: Address,
    seller: Option<Address>,
    verification_required: bool,
    proof_refs: Vec<Hash>,
    state: TxState,
    policy: VotePolicy,
    arbitrator: Option<Address>,
    tally: Option<VoteTally>,
    arbitration: Option<ArbitrationCase>,
    seller_ciphertext: Option<Vec<u8>>,
    /// Buyer ciphertext produced by the key handoff.
    buyer_ciphertext: Option<Vec<u8>>,
    degraded: bool,
    last_applied: Option<LogPosition>,
    last_block: BlockNumber,
}

impl TransactionStateMachine {
    /// A purchase whose prepare-to-buy was submitted.
    pub fn pending(
        publish_id: PublishId,
        buyer: Address,
        policy: VotePolicy,
        arbitrator: Option<Address>,
    ) -> Self {
        Self {
            tx_id: None,
            publish_id,
            buyer,
            seller: None,
            verification_required: false,
            proof_refs: Vec::new(),
            state: TxState::Pending,
            policy,
            arbitrator,
            tally: None,
            arbitration: None,
            seller_ciphertext: None,
            buyer_ciphertext: None,
            degraded: false,
            last_applied: None,
            last_block: 0,
        }
    }

    pub fn tx_id(&self) -> Option<TransactionId> {
        self.tx_id
    }

    pub fn publish_id(&self) -> &PublishId {
        &self.publish_id
    }

    pub fn buyer(&self) -> Address {
        self.buyer
    }

    pub fn seller(&self) -> Option<Address> {
        self.seller
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn verification_required(&self) -> bool {
        self.verification_required
    }

    pub fn proof_refs(&self) -> &[Hash] {
        &self.proof_refs
    }

    pub fn tally(&self) -> Option<&VoteTally> {
        self.tally.as_ref()
    }

    pub fn arbitration(&self) -> Option<&ArbitrationCase> {
        self.arbitration.as_ref()
    }

    pub fn buyer_ciphertext(&self) -> Option<&[u8]> {
        self.buyer_ciphertext.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn mark_degraded(&mut self) {
        self.degraded = true;
    }

    pub fn last_applied(&self) -> Option<LogPosition> {
        self.last_applied
    }

    /// Handoff still owed for a `Buying` transaction whose key was never
    /// re-sealed (a restart interrupted it).
    pub fn pending_handoff(&self) -> Option<Effect> {
        if self.state != TxState::Buying || self.buyer_ciphertext.is_some() {
            return None;
        }
        let seller_ciphertext = self.seller_ciphertext.clone()?;
        Some(Effect::RequestHandoff {
            seller_ciphertext,
            seller: self.seller?,
            buyer: self.buyer,
        })
    }

    /// Whether a tick can still change the vote outcome.
    pub fn awaits_votes(&self) -> bool {
        self.state == TxState::Created && self.tally.is_some()
    }

    /// Apply `trigger`. Ledger events at or before the last applied
    /// position are duplicates.
    pub fn apply(&mut self, trigger: Trigger, at: Stamp) -> LifecycleResult<Applied> {
        if let Stamp::Log(position) = at {
            if self.last_applied.is_some_and(|last| position <= last) {
                debug!(tx_id = ?self.tx_id, %position, trigger = trigger.name(), "Replayed event ignored");
                return Ok(Applied::Duplicate);
            }
        }
        if self.state.is_terminal() {
            return Ok(Applied::Duplicate);
        }

        if let Some(block) = at.block() {
            self.last_block = self.last_block.max(block);
        }
        let applied = self.step(trigger)?;
        if let (Stamp::Log(position), false) = (at, applied == Applied::Duplicate) {
            self.last_applied = Some(position);
        }
        Ok(applied)
    }

    fn step(&mut self, trigger: Trigger) -> LifecycleResult<Applied> {
        let name = trigger.name();
        match trigger {
            Trigger::Created {
                tx_id,
                seller,
                proof_refs,
                verification_required,
            } => {
                if !self.at(&[TxState::Pending], name)? {
                    return Ok(Applied::Duplicate);
                }
                self.tx_id = Some(tx_id);
                self.seller = Some(seller);
                self.proof_refs = proof_refs;
                self.verification_required = verification_required;
                let mut effects = vec![Effect::Bind(tx_id)];
                if verification_required {
                    self.tally = Some(VoteTally::open(
                        self.last_block,
                        self.policy.vote_timeout_blocks,
                    ));
                    effects.push(Effect::AwaitVerification);
                } else {
                    effects.push(Effect::AwaitBuy);
                }
                Ok(self.transition(TxState::Created, name, effects))
            }

            Trigger::VerifiersChosen { verifiers } => {
                if !self.at(&[TxState::Created], name)? {
                    return Ok(Applied::Duplicate);
                }
                let Some(tally) = self.tally.as_mut() else {
                    warn!(tx_id = ?self.tx_id, "Verifiers chosen for a transaction without verification");
                    return Ok(Applied::absorbed());
                };
                match tally.choose(&verifiers) {
                    Ok(()) => {}
                    Err(CoordinationError::AlreadyChosen) => return Ok(Applied::Duplicate),
                    Err(e) => return Err(self.rejected(name, e.to_string())),
                }
                Ok(self.resolve_votes(name))
            }

            Trigger::Vote {
                verifier,
                approve,
                comment,
            } => {
                if !self.at(&[TxState::Created], name)? {
                    return Ok(Applied::Duplicate);
                }
                let Some(tally) = self.tally.as_mut() else {
                    return Err(self.rejected(name, "transaction does not require verification"));
                };
                match tally.record(verifier, approve, comment) {
                    VoteOutcome::Counted => Ok(self.resolve_votes(name)),
                    VoteOutcome::Duplicate => {
                        debug!(tx_id = ?self.tx_id, %verifier, "Second vote ignored");
                        Ok(Applied::Duplicate)
                    }
                    VoteOutcome::NotChosen => {
                        Err(self.rejected(name, format!("{} is not a chosen verifier", verifier)))
                    }
                }
            }

            Trigger::Tick => {
                if !self.awaits_votes() {
                    return Ok(Applied::absorbed());
                }
                Ok(self.resolve_votes(name))
            }

            Trigger::BuyConfirmed {
                buyer,
                seller_ciphertext,
            } => {
                let sources: &[TxState] = if self.verification_required {
                    &[TxState::Voted]
                } else {
                    &[TxState::Created, TxState::Voted]
                };
                if !self.at(sources, name)? {
                    return Ok(Applied::Duplicate);
                }
                if buyer != self.buyer {
                    return Err(self.rejected(name, format!("buy by {} not the buyer", buyer)));
                }
                let seller = self.seller.unwrap_or(Address::ZERO);
                self.seller_ciphertext = Some(seller_ciphertext.clone());
                Ok(self.transition(
                    TxState::Buying,
                    name,
                    vec![Effect::RequestHandoff {
                        seller_ciphertext,
                        seller,
                        buyer,
                    }],
                ))
            }

            Trigger::HandoffComplete { buyer_ciphertext } => {
                if !self.at(&[TxState::Buying], name)? {
                    return Ok(Applied::Duplicate);
                }
                if self.buyer_ciphertext.is_some() {
                    return Ok(Applied::Duplicate);
                }
                self.buyer_ciphertext = Some(buyer_ciphertext.clone());
                Ok(Applied::Absorbed {
                    effects: vec![Effect::SubmitBuyerCiphertext {
                        ciphertext: buyer_ciphertext,
                    }],
                })
            }

            Trigger::HandoffFailed { reason } => {
                if !self.at(&[TxState::Buying], name)? {
                    return Ok(Applied::Duplicate);
                }
                Ok(self.transition(
                    TxState::Failed,
                    name,
                    vec![Effect::Terminate {
                        failure: Some(reason),
                    }],
                ))
            }

            Trigger::ReadyForDownload { buyer_ciphertext } => {
                if !self.at(&[TxState::Buying], name)? {
                    return Ok(Applied::Duplicate);
                }
                let tx_id = self.bound_id()?;
                match self.buyer_ciphertext.as_deref() {
                    None => {
                        return Err(LifecycleError::UnverifiedCiphertext {
                            tx_id,
                            reason: "no verified buyer ciphertext".to_string(),
                        })
                    }
                    Some(verified) if verified != buyer_ciphertext.as_slice() => {
                        return Err(LifecycleError::UnverifiedCiphertext {
                            tx_id,
                            reason: "on-chain ciphertext differs from the verified one".to_string(),
                        })
                    }
                    Some(_) => {}
                }
                Ok(self.transition(TxState::ReadyForDownload, name, vec![Effect::NotifyBuyer]))
            }

            Trigger::DataConfirmed { truth } => {
                if !self.at(&[TxState::ReadyForDownload], name)? {
                    return Ok(Applied::Duplicate);
                }
                if truth {
                    Ok(self.transition(TxState::Payed, name, vec![Effect::ReleasePayment]))
                } else {
                    Ok(self.open_arbitration(name, "buyer disputed the data"))
                }
            }

            Trigger::ArbitrationResult {
                arbitrator,
                approve,
            } => {
                if !self.at(&[TxState::Arbitrating], name)? {
                    return Ok(Applied::Duplicate);
                }
                let default_case = ArbitrationCase::open(self.arbitrator);
                let case = self.arbitration.get_or_insert(default_case);
                match case.decide(arbitrator, approve) {
                    Ok(true) => Ok(self.transition(TxState::Payed, name, vec![Effect::ReleasePayment])),
                    Ok(false) => Ok(self.transition(
                        TxState::Closed,
                        name,
                        vec![Effect::Refund, Effect::Terminate { failure: None }],
                    )),
                    Err(CoordinationError::AlreadyDecided) => Ok(Applied::Duplicate),
                    Err(e) => Err(self.rejected(name, e.to_string())),
                }
            }

            Trigger::Close => {
                if !self.at(&[TxState::Payed], name)? {
                    return Ok(Applied::Duplicate);
                }
                Ok(self.transition(
                    TxState::Closed,
                    name,
                    vec![Effect::Terminate { failure: None }],
                ))
            }

            Trigger::VerifierDisabled { verifier } => {
                debug!(tx_id = ?self.tx_id, %verifier, "Verifier disabled");
                Ok(Applied::absorbed())
            }
        }
    }

    /// `Ok(true)` in one of `sources`, `Ok(false)` when already past them,
    /// `InvalidTransition` when not there yet.
    fn at(&self, sources: &[TxState], trigger: &str) -> LifecycleResult<bool> {
        if sources.contains(&self.state) {
            return Ok(true);
        }
        let furthest = sources.iter().map(TxState::rank).max().unwrap_or(0);
        if self.state.rank() > furthest {
            Ok(false)
        } else {
            Err(LifecycleError::InvalidTransition {
                tx_id: self.tx_id,
                state: self.state,
                trigger: trigger.to_string(),
            })
        }
    }

    fn resolve_votes(&mut self, trigger: &'static str) -> Applied {
        let resolution = self
            .tally
            .as_ref()
            .and_then(|tally| tally.resolve(&self.policy, self.last_block));
        match resolution {
            None => Applied::absorbed(),
            Some(Resolution::Approved) => self.transition(TxState::Voted, trigger, Vec::new()),
            Some(Resolution::Rejected) => self.open_arbitration(trigger, "verifiers rejected"),
            Some(Resolution::TimedOut) => self.open_arbitration(trigger, "verification timed out"),
        }
    }

    fn open_arbitration(&mut self, trigger: &'static str, reason: &str) -> Applied {
        self.arbitration = Some(ArbitrationCase::open(self.arbitrator));
        self.transition(
            TxState::Arbitrating,
            trigger,
            vec![Effect::OpenArbitration {
                reason: reason.to_string(),
            }],
        )
    }

    fn transition(&mut self, to: TxState, trigger: &'static str, effects: Vec<Effect>) -> Applied {
        let from = self.state;
        self.state = to;
        Applied::Transitioned(Transition {
            from,
            to,
            trigger,
            block: self.last_block,
            effects,
        })
    }

    fn bound_id(&self) -> LifecycleResult<TransactionId> {
        self.tx_id.ok_or(LifecycleError::InvalidTransition {
            tx_id: None,
            state: self.state,
            trigger: "unbound".to_string(),
        })
    }

    fn rejected(&self, trigger: &str, reason: impl Into<String>) -> LifecycleError {
        LifecycleError::Rejected {
            tx_id: self.tx_id,
            trigger: trigger.to_string(),
            reason: reason.into(),
        }
    }
}
