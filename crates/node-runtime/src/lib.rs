//! # Node Runtime Library
//!
//! Wiring, scan pipeline and persistence of the data exchange node.
//! The main entry point is the `main.rs` binary.
//!
//! ## Architectural Patterns
//!
//! - **Event-Driven**: the lifecycle engine only reacts to finalized ledger events
//! - **Hexagonal Architecture**: ports define contracts, adapters implement them
//! - **Single writer per transaction**: the router serializes each transaction's events

#![allow(clippy::type_complexity)]

pub mod container;
pub mod persistence;
pub mod pipeline;
pub mod runtime;

pub use container::{load_config, ConfigError, NodeConfig, RuntimePorts, SubsystemContainer};
pub use persistence::DataDir;
pub use pipeline::{Pipeline, PipelineExit};
pub use runtime::{ExchangeRuntime, ShutdownReport};
