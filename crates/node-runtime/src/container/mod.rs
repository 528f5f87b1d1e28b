//! # Subsystem Container
//!
//! Configuration plus the container that builds and owns every subsystem.

pub mod config;
pub mod subsystems;

pub use config::{load_config, ConfigError, NodeConfig};
pub use subsystems::{RuntimePorts, SubsystemContainer};
