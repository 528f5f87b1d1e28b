//! # dx-01-event-decoder
//!
//! Turns raw contract logs into named, validated events.
//!
//! ## Overview
//!
//! ```text
//! RawLog ──decode()──→ LedgerEvent ──MarketEvent::try_from──→ MarketEvent
//!   │                      │
//!   │ contract + topic0    │ field names from the schema
//!   ▼                      ▼
//! EventSchemaProvider   typed variant per event name
//! ```
//!
//! Each contract in the known set has a list of event schemas. A log is
//! matched by emitting contract and `topics[0]` (Keccak-256 of the canonical
//! signature), then its positional fields are checked against the schema's
//! declared kinds. Anything that does not match is a `DecodeError`, which
//! the scanner logs and skips.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{marketplace_schema, StaticSchemaProvider};
pub use domain::{keccak256, EventName, EventSchema, FieldSpec, MarketEvent};
pub use error::{DecodeError, DecodeResult};
pub use ports::EventSchemaProvider;
pub use service::EventDecoder;
