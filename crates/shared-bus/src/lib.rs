//! # Shared Bus - Notification Sink
//!
//! Push-only channel through which the lifecycle engine reports what it did.
//!
//! ```text
//! ┌──────────────────┐                     ┌──────────────┐
//! │ Lifecycle Engine │     notify()        │  UI / CLI    │
//! │                  │ ──────┐             │              │
//! └──────────────────┘       │             └──────────────┘
//!                            ▼                    ↑
//!                  ┌──────────────────┐           │
//!                  │ Notification Bus │ ──────────┘
//!                  └──────────────────┘  subscribe()
//! ```
//!
//! ## Guarantees
//!
//! - One notification per applied state transition.
//! - One notification per dropped or anomalous event, with transaction id,
//!   block and event name, so it can be diagnosed without reading logs.
//! - One notification per terminal transaction failure.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod notifications;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use notifications::{
    AnomalyKind, Notification, NotificationFilter, NotificationKind, NotificationPayload,
};
pub use publisher::{InMemoryNotificationBus, NotificationSink};
pub use subscriber::{NotificationStream, NotificationSubscription, SubscriptionError};

/// Maximum notifications buffered per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
