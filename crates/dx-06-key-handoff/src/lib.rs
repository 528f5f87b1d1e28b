//! # dx-06-key-handoff
//!
//! Moves a purchased item's key from seller custody to buyer custody.
//!
//! ## Overview
//!
//! When the buy is confirmed the seller's ciphertext (key sealed for the
//! seller) is handed to an external re-encryption service, which returns the
//! same key sealed for the buyer. The core never sees plaintext.
//!
//! ```text
//! Lifecycle ──hand_off(tx, seller_ct)──→ HandoffManager ──reencrypt()──→ KeyService
//!                                             │
//!                                             ├── Unavailable ──→ retry with backoff
//!                                             ├── Denied / Malformed / empty ──→ Failed
//!                                             └── Ok(buyer_ct) ──→ Complete
//! ```
//!
//! `Buying → ReadyForDownload` is only reachable once the record for the
//! transaction is `Complete`.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::DevKeyService;
pub use domain::{Ciphertext, HandoffRecord, HandoffStatus};
pub use error::{HandoffError, HandoffResult, KeyServiceError};
pub use ports::{KeyHandoffApi, KeyService};
pub use service::{HandoffConfig, HandoffManager};
