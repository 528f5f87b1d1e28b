//! Ports module for Key Handoff

pub mod inbound;
pub mod outbound;

pub use inbound::KeyHandoffApi;
pub use outbound::KeyService;
