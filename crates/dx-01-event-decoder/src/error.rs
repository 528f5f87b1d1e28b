//! Error types for Event Decoder

use shared_types::{Address, FieldKind};
use thiserror::Error;

/// Decode errors. Never fatal to a scan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Log emitted by a contract outside the known set
    #[error("Unknown contract: {contract}")]
    UnknownContract { contract: Address },

    /// Log without a signature topic
    #[error("Log has no signature topic")]
    MissingTopic,

    /// No schema of the contract matches the signature topic
    #[error("Unknown event topic 0x{topic} on {contract}")]
    UnknownEvent { contract: Address, topic: String },

    /// Wrong number of positional fields
    #[error("{event}: expected {expected} fields, got {actual}")]
    FieldCountMismatch {
        event: String,
        expected: usize,
        actual: usize,
    },

    /// Field value of the wrong kind
    #[error("{event}.{field}: expected {expected}, got {actual}")]
    FieldTypeMismatch {
        event: String,
        field: String,
        expected: FieldKind,
        actual: FieldKind,
    },

    /// Named field absent from a decoded event
    #[error("{event}: missing field {field}")]
    MissingField { event: String, field: String },

    /// Field present but its value is unusable
    #[error("{event}.{field}: {reason}")]
    InvalidValue {
        event: String,
        field: String,
        reason: String,
    },

    /// Event name has no typed counterpart
    #[error("No typed event for {name}")]
    UnsupportedEvent { name: String },
}

impl DecodeError {
    /// Event name, when the log got far enough to be named.
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::FieldCountMismatch { event, .. }
            | Self::FieldTypeMismatch { event, .. }
            | Self::MissingField { event, .. }
            | Self::InvalidValue { event, .. } => Some(event),
            Self::UnsupportedEvent { name } => Some(name),
            Self::UnknownContract { .. } | Self::MissingTopic | Self::UnknownEvent { .. } => None,
        }
    }
}

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;
