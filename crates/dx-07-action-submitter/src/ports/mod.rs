//! Ports module for Action Submitter

pub mod inbound;
pub mod outbound;

pub use inbound::ActionApi;
pub use outbound::Signer;
