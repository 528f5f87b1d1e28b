//! Subscriptions

use super::routed::RoutedEvent;
use crate::ports::EventHandler;
use dx_01_event_decoder::EventName;
use shared_types::{Address, TransactionId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which events of the subscribed name reach the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionScope {
    /// Events of one business transaction.
    Transaction(TransactionId),
    /// Events naming the subscribing actor.
    Actor,
    /// Every event of the name.
    Any,
}

/// (actor, event name, scope, handler).
pub struct Subscription {
    pub id: SubscriptionId,
    pub actor: Address,
    pub event: EventName,
    pub scope: SubscriptionScope,
    pub handler: Arc<dyn EventHandler>,
    /// Registration order; handlers of one event run in this order.
    pub(crate) seq: u64,
}

impl Subscription {
    pub fn matches(&self, routed: &RoutedEvent) -> bool {
        if routed.name() != self.event {
            return false;
        }
        match self.scope {
            SubscriptionScope::Transaction(tx_id) => routed.transaction_id() == Some(tx_id),
            SubscriptionScope::Actor => routed.involves(&self.actor),
            SubscriptionScope::Any => true,
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self.scope {
            SubscriptionScope::Transaction(tx_id) => Some(tx_id),
            _ => None,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("event", &self.event)
            .field("scope", &self.scope)
            .field("handler", &self.handler.label())
            .finish()
    }
}
