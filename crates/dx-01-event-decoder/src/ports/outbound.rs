//! Driven Ports (SPI - Outbound Dependencies)

use crate::domain::EventSchema;
use shared_types::{Address, Hash};

/// Source of event schemas for the known contract set.
pub trait EventSchemaProvider: Send + Sync {
    /// Schemas of one contract, or `None` if the contract is not known.
    fn schemas(&self, contract: &Address) -> Option<&[EventSchema]>;

    /// Every known contract.
    fn contracts(&self) -> Vec<Address>;

    /// Signature topics of every known event, deduplicated.
    fn topics(&self) -> Vec<Hash> {
        let mut topics: Vec<Hash> = Vec::new();
        for contract in self.contracts() {
            for schema in self.schemas(&contract).unwrap_or_default() {
                if !topics.contains(&schema.topic()) {
                    topics.push(schema.topic());
                }
            }
        }
        topics
    }
}
