//! Ports module for Event Scanner

pub mod outbound;

pub use outbound::CursorStore;
pub use shared_types::LedgerClient;
