//! Routed events and lane keys

use dx_01_event_decoder::{DecodeError, EventName, MarketEvent};
use shared_types::{Address, LedgerEvent, LogPosition, TransactionId};
use std::fmt;

/// A ledger event together with its typed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedEvent {
    pub ledger: LedgerEvent,
    pub event: MarketEvent,
}

impl RoutedEvent {
    pub fn new(ledger: LedgerEvent, event: MarketEvent) -> Self {
        Self { ledger, event }
    }

    pub fn name(&self) -> EventName {
        self.event.name()
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.event.transaction_id()
    }

    pub fn position(&self) -> LogPosition {
        self.ledger.position()
    }

    pub fn involves(&self, actor: &Address) -> bool {
        self.event.involved_actors().contains(actor)
    }

    /// Lane this event is serialized on.
    pub fn lane_key(&self) -> LaneKey {
        if let Some(tx_id) = self.transaction_id() {
            return LaneKey::Transaction(tx_id);
        }
        match self.event.involved_actors().first() {
            Some(actor) => LaneKey::Actor(*actor),
            None => LaneKey::Contract(self.ledger.contract),
        }
    }
}

impl TryFrom<LedgerEvent> for RoutedEvent {
    type Error = DecodeError;

    fn try_from(ledger: LedgerEvent) -> Result<Self, Self::Error> {
        let event = MarketEvent::try_from(&ledger)?;
        Ok(Self { ledger, event })
    }
}

/// Serialization key of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKey {
    Transaction(TransactionId),
    Actor(Address),
    Contract(Address),
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKey::Transaction(id) => write!(f, "tx:{}", id),
            LaneKey::Actor(actor) => write!(f, "actor:{}", actor),
            LaneKey::Contract(contract) => write!(f, "contract:{}", contract),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::FieldMap;

    fn ledger(name: &str) -> LedgerEvent {
        LedgerEvent {
            contract: Address([9; 20]),
            name: name.to_string(),
            block_number: 10,
            log_index: 1,
            fields: FieldMap::new(),
        }
    }

    #[test]
    fn test_lane_key_prefers_transaction_then_actor() {
        let vote = RoutedEvent::new(
            ledger("Vote"),
            MarketEvent::Vote {
                tx_id: TransactionId::from(42),
                verifier: Address([1; 20]),
                approve: true,
                comment: String::new(),
                state: 2,
            },
        );
        assert_eq!(vote.lane_key(), LaneKey::Transaction(TransactionId::from(42)));

        let register = RoutedEvent::new(
            ledger("RegisterVerifier"),
            MarketEvent::RegisterVerifier {
                verifier: Address([1; 20]),
            },
        );
        assert_eq!(register.lane_key(), LaneKey::Actor(Address([1; 20])));
        assert!(register.involves(&Address([1; 20])));
        assert_eq!(register.position(), LogPosition::new(10, 1));
    }
}
