//! Ports module for Event Router

pub mod outbound;

pub use outbound::EventHandler;
