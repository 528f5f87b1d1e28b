//! # dx-03-event-router
//!
//! Routes decoded ledger events to the subscribers waiting for them.
//!
//! ## Lanes
//!
//! ```text
//! dispatch(event) ──→ lane key ──┬─→ [Transaction(42)] ─→ handlers, one event at a time
//!    (never blocks)              ├─→ [Transaction(43)] ─→ handlers
//!                                └─→ [Actor(0xab..)]   ─→ handlers
//! ```
//!
//! The lane key is the event's transaction id, or its first involved actor
//! when it has none, or the emitting contract as a last resort. Events that
//! share a key are handled in arrival order; different keys run in parallel.
//!
//! Subscribers are resolved when the lane reaches the event, so a handler
//! that subscribes while handling `TransactionCreate` sees the next event of
//! that transaction. A failing or panicking handler is logged and counted,
//! and the lane moves on.

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{LaneKey, RoutedEvent, Subscription, SubscriptionId, SubscriptionScope};
pub use error::{HandlerError, HandlerResult};
pub use ports::EventHandler;
pub use service::{EventRouter, RouterStats};
