//! Domain layer for Event Router

pub mod routed;
pub mod subscription;

pub use routed::{LaneKey, RoutedEvent};
pub use subscription::{Subscription, SubscriptionId, SubscriptionScope};
