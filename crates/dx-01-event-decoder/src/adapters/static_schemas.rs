//! Static schema provider
//!
//! The marketplace deploys two contracts: the protocol contract (listings,
//! transactions, verifiers, arbitration) and the token contract (payment
//! approvals).

use crate::domain::{EventName, EventSchema, FieldSpec};
use crate::ports::EventSchemaProvider;
use shared_types::{Address, FieldKind};
use std::collections::HashMap;

/// Schema of one marketplace event.
pub fn marketplace_schema(name: EventName) -> EventSchema {
    use FieldKind as K;
    let f = FieldSpec::new;
    let fields = match name {
        EventName::DataPublish => vec![
            f("publishId", K::String),
            f("price", K::Uint256),
            f("despDataId", K::String),
            f("proofIds", K::Bytes32Array),
            f("seller", K::Address),
            f("supportVerify", K::Bool),
        ],
        EventName::Approval => vec![
            FieldSpec::indexed("owner", K::Address),
            FieldSpec::indexed("spender", K::Address),
            f("value", K::Uint256),
        ],
        EventName::TransactionCreate => vec![
            f("transactionId", K::Uint256),
            f("publishId", K::String),
            f("users", K::AddressArray),
            f("proofIds", K::Bytes32Array),
            f("needVerify", K::Bool),
            f("state", K::Uint8),
        ],
        EventName::RegisterVerifier => vec![f("verifier", K::Address)],
        EventName::VerifiersChosen => vec![
            f("transactionId", K::Uint256),
            f("publishId", K::String),
            f("verifiers", K::AddressArray),
            f("state", K::Uint8),
        ],
        EventName::Vote => vec![
            f("transactionId", K::Uint256),
            f("verifier", K::Address),
            f("judge", K::Bool),
            f("comments", K::String),
            f("state", K::Uint8),
        ],
        EventName::Buy => vec![
            f("transactionId", K::Uint256),
            f("metaDataIdEncSeller", K::Bytes),
            f("buyer", K::Address),
            f("state", K::Uint8),
        ],
        EventName::ReadyForDownload => vec![
            f("transactionId", K::Uint256),
            f("metaDataIdEncBuyer", K::Bytes),
            f("state", K::Uint8),
        ],
        EventName::DataConfirmed => vec![
            f("transactionId", K::Uint256),
            f("buyer", K::Address),
            f("truth", K::Bool),
            f("state", K::Uint8),
        ],
        EventName::ArbitrationResult => vec![
            f("transactionId", K::Uint256),
            f("arbitrator", K::Address),
            f("judge", K::Bool),
            f("state", K::Uint8),
        ],
        EventName::TransactionClose => {
            vec![f("transactionId", K::Uint256), f("state", K::Uint8)]
        }
        EventName::VerifierDisable => {
            vec![f("verifier", K::Address), f("transactionId", K::Uint256)]
        }
    };
    EventSchema::new(name.as_str(), fields)
}

/// Fixed contract → schemas table.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    contracts: HashMap<Address, Vec<EventSchema>>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Protocol contract with every lifecycle event, token contract with
    /// `Approval`.
    pub fn marketplace(protocol: Address, token: Address) -> Self {
        let protocol_events = EventName::ALL
            .iter()
            .copied()
            .filter(|name| *name != EventName::Approval)
            .map(marketplace_schema)
            .collect();
        Self::new()
            .with_contract(protocol, protocol_events)
            .with_contract(token, vec![marketplace_schema(EventName::Approval)])
    }

    /// Add (or extend) a contract's schema list.
    pub fn with_contract(mut self, contract: Address, schemas: Vec<EventSchema>) -> Self {
        self.contracts.entry(contract).or_default().extend(schemas);
        self
    }
}

impl EventSchemaProvider for StaticSchemaProvider {
    fn schemas(&self, contract: &Address) -> Option<&[EventSchema]> {
        self.contracts.get(contract).map(|s| s.as_slice())
    }

    fn contracts(&self) -> Vec<Address> {
        let mut contracts: Vec<Address> = self.contracts.keys().copied().collect();
        contracts.sort();
        contracts
    }
}
