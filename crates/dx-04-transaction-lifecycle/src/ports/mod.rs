//! Ports module for the Transaction Lifecycle

pub mod inbound;
pub mod outbound;

pub use inbound::{LifecycleApi, PublishRequest};
pub use outbound::ContentStore;
