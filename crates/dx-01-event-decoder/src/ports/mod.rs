//! Ports module for Event Decoder

pub mod outbound;

pub use outbound::EventSchemaProvider;
