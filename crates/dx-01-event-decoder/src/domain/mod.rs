//! Domain module for Event Decoder
//!
//! - schema: event signatures and field declarations
//! - events: typed marketplace events

pub mod events;
pub mod schema;

pub use events::{EventName, MarketEvent};
pub use schema::{keccak256, EventSchema, FieldSpec};
