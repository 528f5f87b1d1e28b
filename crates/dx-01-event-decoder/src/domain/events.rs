//! Typed marketplace events
//!
//! One variant per contract event. Produced once at the decoder boundary;
//! nothing downstream reads fields by name.

use crate::error::{DecodeError, DecodeResult};
use serde::{Deserialize, Serialize};
use shared_types::{
    Address, BlockNumber, FieldKind, FieldValue, Hash, LedgerEvent, PublishId, RawLog,
    TransactionId, U256,
};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// EVENT NAMES
// =============================================================================

/// Event names emitted by the protocol and token contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    DataPublish,
    Approval,
    TransactionCreate,
    RegisterVerifier,
    VerifiersChosen,
    Vote,
    Buy,
    ReadyForDownload,
    DataConfirmed,
    ArbitrationResult,
    TransactionClose,
    VerifierDisable,
}

impl EventName {
    pub const ALL: [EventName; 12] = [
        EventName::DataPublish,
        EventName::Approval,
        EventName::TransactionCreate,
        EventName::RegisterVerifier,
        EventName::VerifiersChosen,
        EventName::Vote,
        EventName::Buy,
        EventName::ReadyForDownload,
        EventName::DataConfirmed,
        EventName::ArbitrationResult,
        EventName::TransactionClose,
        EventName::VerifierDisable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::DataPublish => "DataPublish",
            EventName::Approval => "Approval",
            EventName::TransactionCreate => "TransactionCreate",
            EventName::RegisterVerifier => "RegisterVerifier",
            EventName::VerifiersChosen => "VerifiersChosen",
            EventName::Vote => "Vote",
            EventName::Buy => "Buy",
            EventName::ReadyForDownload => "ReadyForDownload",
            EventName::DataConfirmed => "DataConfirmed",
            EventName::ArbitrationResult => "ArbitrationResult",
            EventName::TransactionClose => "TransactionClose",
            EventName::VerifierDisable => "VerifierDisable",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| DecodeError::UnsupportedEvent { name: s.to_string() })
    }
}

// =============================================================================
// MARKET EVENTS
// =============================================================================

/// A decoded marketplace event.
///
/// `state` fields carry the contract's own state code for the transaction
/// after the event; the lifecycle engine keeps its own state and only logs
/// disagreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    DataPublish {
        publish_id: PublishId,
        price: U256,
        description_ref: String,
        proof_refs: Vec<Hash>,
        seller: Address,
        verification_required: bool,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: U256,
    },
    TransactionCreate {
        tx_id: TransactionId,
        publish_id: PublishId,
        buyer: Address,
        seller: Address,
        proof_refs: Vec<Hash>,
        verification_required: bool,
        state: u8,
    },
    RegisterVerifier {
        verifier: Address,
    },
    VerifiersChosen {
        tx_id: TransactionId,
        publish_id: PublishId,
        verifiers: Vec<Address>,
        state: u8,
    },
    Vote {
        tx_id: TransactionId,
        verifier: Address,
        approve: bool,
        comment: String,
        state: u8,
    },
    Buy {
        tx_id: TransactionId,
        /// Key sealed for the seller.
        seller_ciphertext: Vec<u8>,
        buyer: Address,
        state: u8,
    },
    ReadyForDownload {
        tx_id: TransactionId,
        /// Key sealed for the buyer.
        buyer_ciphertext: Vec<u8>,
        state: u8,
    },
    DataConfirmed {
        tx_id: TransactionId,
        buyer: Address,
        truth: bool,
        state: u8,
    },
    ArbitrationResult {
        tx_id: TransactionId,
        arbitrator: Address,
        approve: bool,
        state: u8,
    },
    TransactionClose {
        tx_id: TransactionId,
        state: u8,
    },
    VerifierDisable {
        verifier: Address,
        tx_id: TransactionId,
    },
}

impl MarketEvent {
    pub fn name(&self) -> EventName {
        match self {
            MarketEvent::DataPublish { .. } => EventName::DataPublish,
            MarketEvent::Approval { .. } => EventName::Approval,
            MarketEvent::TransactionCreate { .. } => EventName::TransactionCreate,
            MarketEvent::RegisterVerifier { .. } => EventName::RegisterVerifier,
            MarketEvent::VerifiersChosen { .. } => EventName::VerifiersChosen,
            MarketEvent::Vote { .. } => EventName::Vote,
            MarketEvent::Buy { .. } => EventName::Buy,
            MarketEvent::ReadyForDownload { .. } => EventName::ReadyForDownload,
            MarketEvent::DataConfirmed { .. } => EventName::DataConfirmed,
            MarketEvent::ArbitrationResult { .. } => EventName::ArbitrationResult,
            MarketEvent::TransactionClose { .. } => EventName::TransactionClose,
            MarketEvent::VerifierDisable { .. } => EventName::VerifierDisable,
        }
    }

    /// Business transaction this event belongs to, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            MarketEvent::TransactionCreate { tx_id, .. }
            | MarketEvent::VerifiersChosen { tx_id, .. }
            | MarketEvent::Vote { tx_id, .. }
            | MarketEvent::Buy { tx_id, .. }
            | MarketEvent::ReadyForDownload { tx_id, .. }
            | MarketEvent::DataConfirmed { tx_id, .. }
            | MarketEvent::ArbitrationResult { tx_id, .. }
            | MarketEvent::TransactionClose { tx_id, .. }
            | MarketEvent::VerifierDisable { tx_id, .. } => Some(*tx_id),
            MarketEvent::DataPublish { .. }
            | MarketEvent::Approval { .. }
            | MarketEvent::RegisterVerifier { .. } => None,
        }
    }

    /// Actors named by the event.
    pub fn involved_actors(&self) -> Vec<Address> {
        match self {
            MarketEvent::DataPublish { seller, .. } => vec![*seller],
            MarketEvent::Approval { owner, .. } => vec![*owner],
            MarketEvent::TransactionCreate { buyer, seller, .. } => vec![*buyer, *seller],
            MarketEvent::RegisterVerifier { verifier } => vec![*verifier],
            MarketEvent::VerifiersChosen { verifiers, .. } => verifiers.clone(),
            MarketEvent::Vote { verifier, .. } => vec![*verifier],
            MarketEvent::Buy { buyer, .. } => vec![*buyer],
            MarketEvent::ReadyForDownload { .. } => vec![],
            MarketEvent::DataConfirmed { buyer, .. } => vec![*buyer],
            MarketEvent::ArbitrationResult { arbitrator, .. } => vec![*arbitrator],
            MarketEvent::TransactionClose { .. } => vec![],
            MarketEvent::VerifierDisable { verifier, .. } => vec![*verifier],
        }
    }

    /// Positional field values in schema order.
    pub fn to_fields(&self) -> Vec<FieldValue> {
        use FieldValue as F;
        let id = |tx: &TransactionId| F::Uint(tx.as_u256());
        match self {
            MarketEvent::DataPublish {
                publish_id,
                price,
                description_ref,
                proof_refs,
                seller,
                verification_required,
            } => vec![
                F::String(publish_id.as_str().to_string()),
                F::Uint(*price),
                F::String(description_ref.clone()),
                F::Bytes32Array(proof_refs.clone()),
                F::Address(*seller),
                F::Bool(*verification_required),
            ],
            MarketEvent::Approval {
                owner,
                spender,
                value,
            } => vec![F::Address(*owner), F::Address(*spender), F::Uint(*value)],
            MarketEvent::TransactionCreate {
                tx_id,
                publish_id,
                buyer,
                seller,
                proof_refs,
                verification_required,
                state,
            } => vec![
                id(tx_id),
                F::String(publish_id.as_str().to_string()),
                F::AddressArray(vec![*buyer, *seller]),
                F::Bytes32Array(proof_refs.clone()),
                F::Bool(*verification_required),
                F::Uint8(*state),
            ],
            MarketEvent::RegisterVerifier { verifier } => vec![F::Address(*verifier)],
            MarketEvent::VerifiersChosen {
                tx_id,
                publish_id,
                verifiers,
                state,
            } => vec![
                id(tx_id),
                F::String(publish_id.as_str().to_string()),
                F::AddressArray(verifiers.clone()),
                F::Uint8(*state),
            ],
            MarketEvent::Vote {
                tx_id,
                verifier,
                approve,
                comment,
                state,
            } => vec![
                id(tx_id),
                F::Address(*verifier),
                F::Bool(*approve),
                F::String(comment.clone()),
                F::Uint8(*state),
            ],
            MarketEvent::Buy {
                tx_id,
                seller_ciphertext,
                buyer,
                state,
            } => vec![
                id(tx_id),
                F::Bytes(seller_ciphertext.clone()),
                F::Address(*buyer),
                F::Uint8(*state),
            ],
            MarketEvent::ReadyForDownload {
                tx_id,
                buyer_ciphertext,
                state,
            } => vec![id(tx_id), F::Bytes(buyer_ciphertext.clone()), F::Uint8(*state)],
            MarketEvent::DataConfirmed {
                tx_id,
                buyer,
                truth,
                state,
            } => vec![
                id(tx_id),
                F::Address(*buyer),
                F::Bool(*truth),
                F::Uint8(*state),
            ],
            MarketEvent::ArbitrationResult {
                tx_id,
                arbitrator,
                approve,
                state,
            } => vec![
                id(tx_id),
                F::Address(*arbitrator),
                F::Bool(*approve),
                F::Uint8(*state),
            ],
            MarketEvent::TransactionClose { tx_id, state } => {
                vec![id(tx_id), F::Uint8(*state)]
            }
            MarketEvent::VerifierDisable { verifier, tx_id } => {
                vec![F::Address(*verifier), id(tx_id)]
            }
        }
    }

    /// Build the log a contract would emit for this event.
    pub fn to_raw_log(
        &self,
        contract: Address,
        topic: Hash,
        block_number: BlockNumber,
        log_index: u32,
    ) -> RawLog {
        let mut block_hash = [0u8; 32];
        block_hash[..8].copy_from_slice(&block_number.to_be_bytes());
        RawLog {
            address: contract,
            topics: vec![topic],
            fields: self.to_fields(),
            block_number,
            block_hash,
            log_index,
            removed: false,
        }
    }
}

// =============================================================================
// FIELD EXTRACTION
// =============================================================================

struct Fields<'a> {
    event: &'a LedgerEvent,
}

impl<'a> Fields<'a> {
    fn get(&self, field: &str) -> DecodeResult<&'a FieldValue> {
        self.event
            .fields
            .get(field)
            .ok_or_else(|| DecodeError::MissingField {
                event: self.event.name.clone(),
                field: field.to_string(),
            })
    }

    fn mismatch(&self, field: &str, expected: FieldKind, got: &FieldValue) -> DecodeError {
        DecodeError::FieldTypeMismatch {
            event: self.event.name.clone(),
            field: field.to_string(),
            expected,
            actual: got.kind(),
        }
    }

    fn uint(&self, field: &str) -> DecodeResult<U256> {
        match self.get(field)? {
            FieldValue::Uint(v) => Ok(*v),
            other => Err(self.mismatch(field, FieldKind::Uint256, other)),
        }
    }

    fn tx_id(&self, field: &str) -> DecodeResult<TransactionId> {
        self.uint(field).map(TransactionId::new)
    }

    fn uint8(&self, field: &str) -> DecodeResult<u8> {
        match self.get(field)? {
            FieldValue::Uint8(v) => Ok(*v),
            other => Err(self.mismatch(field, FieldKind::Uint8, other)),
        }
    }

    fn boolean(&self, field: &str) -> DecodeResult<bool> {
        match self.get(field)? {
            FieldValue::Bool(v) => Ok(*v),
            other => Err(self.mismatch(field, FieldKind::Bool, other)),
        }
    }

    fn address(&self, field: &str) -> DecodeResult<Address> {
        match self.get(field)? {
            FieldValue::Address(v) => Ok(*v),
            other => Err(self.mismatch(field, FieldKind::Address, other)),
        }
    }

    fn addresses(&self, field: &str) -> DecodeResult<Vec<Address>> {
        match self.get(field)? {
            FieldValue::AddressArray(v) => Ok(v.clone()),
            other => Err(self.mismatch(field, FieldKind::AddressArray, other)),
        }
    }

    fn bytes(&self, field: &str) -> DecodeResult<Vec<u8>> {
        match self.get(field)? {
            FieldValue::Bytes(v) => Ok(v.clone()),
            other => Err(self.mismatch(field, FieldKind::Bytes, other)),
        }
    }

    fn hashes(&self, field: &str) -> DecodeResult<Vec<Hash>> {
        match self.get(field)? {
            FieldValue::Bytes32Array(v) => Ok(v.clone()),
            other => Err(self.mismatch(field, FieldKind::Bytes32Array, other)),
        }
    }

    fn string(&self, field: &str) -> DecodeResult<String> {
        match self.get(field)? {
            FieldValue::String(v) => Ok(v.clone()),
            other => Err(self.mismatch(field, FieldKind::String, other)),
        }
    }

    fn invalid(&self, field: &str, reason: impl Into<String>) -> DecodeError {
        DecodeError::InvalidValue {
            event: self.event.name.clone(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl TryFrom<&LedgerEvent> for MarketEvent {
    type Error = DecodeError;

    fn try_from(event: &LedgerEvent) -> Result<Self, Self::Error> {
        let f = Fields { event };
        let name: EventName = event.name.parse()?;

        let decoded = match name {
            EventName::DataPublish => MarketEvent::DataPublish {
                publish_id: PublishId::new(f.string("publishId")?),
                price: f.uint("price")?,
                description_ref: f.string("despDataId")?,
                proof_refs: f.hashes("proofIds")?,
                seller: f.address("seller")?,
                verification_required: f.boolean("supportVerify")?,
            },
            EventName::Approval => MarketEvent::Approval {
                owner: f.address("owner")?,
                spender: f.address("spender")?,
                value: f.uint("value")?,
            },
            EventName::TransactionCreate => {
                let users = f.addresses("users")?;
                let [buyer, seller] = users[..] else {
                    return Err(f.invalid(
                        "users",
                        format!("expected [buyer, seller], got {} addresses", users.len()),
                    ));
                };
                MarketEvent::TransactionCreate {
                    tx_id: f.tx_id("transactionId")?,
                    publish_id: PublishId::new(f.string("publishId")?),
                    buyer,
                    seller,
                    proof_refs: f.hashes("proofIds")?,
                    verification_required: f.boolean("needVerify")?,
                    state: f.uint8("state")?,
                }
            }
            EventName::RegisterVerifier => MarketEvent::RegisterVerifier {
                verifier: f.address("verifier")?,
            },
            EventName::VerifiersChosen => MarketEvent::VerifiersChosen {
                tx_id: f.tx_id("transactionId")?,
                publish_id: PublishId::new(f.string("publishId")?),
                verifiers: f.addresses("verifiers")?,
                state: f.uint8("state")?,
            },
            EventName::Vote => MarketEvent::Vote {
                tx_id: f.tx_id("transactionId")?,
                verifier: f.address("verifier")?,
                approve: f.boolean("judge")?,
                comment: f.string("comments")?,
                state: f.uint8("state")?,
            },
            EventName::Buy => MarketEvent::Buy {
                tx_id: f.tx_id("transactionId")?,
                seller_ciphertext: f.bytes("metaDataIdEncSeller")?,
                buyer: f.address("buyer")?,
                state: f.uint8("state")?,
            },
            EventName::ReadyForDownload => MarketEvent::ReadyForDownload {
                tx_id: f.tx_id("transactionId")?,
                buyer_ciphertext: f.bytes("metaDataIdEncBuyer")?,
                state: f.uint8("state")?,
            },
            EventName::DataConfirmed => MarketEvent::DataConfirmed {
                tx_id: f.tx_id("transactionId")?,
                buyer: f.address("buyer")?,
                truth: f.boolean("truth")?,
                state: f.uint8("state")?,
            },
            EventName::ArbitrationResult => MarketEvent::ArbitrationResult {
                tx_id: f.tx_id("transactionId")?,
                arbitrator: f.address("arbitrator")?,
                approve: f.boolean("judge")?,
                state: f.uint8("state")?,
            },
            EventName::TransactionClose => MarketEvent::TransactionClose {
                tx_id: f.tx_id("transactionId")?,
                state: f.uint8("state")?,
            },
            EventName::VerifierDisable => MarketEvent::VerifierDisable {
                verifier: f.address("verifier")?,
                tx_id: f.tx_id("transactionId")?,
            },
        };
        Ok(decoded)
    }
}
