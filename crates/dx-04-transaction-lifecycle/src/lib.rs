//! # dx-04-transaction-lifecycle
//!
//! One state machine per business transaction, driven by routed ledger
//! events, plus the engine that carries out what each transition asks for.
//!
//! ## Overview
//!
//! ```text
//! purchase() ──ApproveTransfer──→ Approval ──prepare_to_buy()──→ Pending
//!                                                                  │
//!                  TransactionCreate(txId) ──bind──────────────────┘
//!                                │
//!        ┌───────────────────────┴───────────────┐
//!        ▼                                       ▼
//!     Created ──votes──→ Voted ──Buy──→ Buying ──handoff──→ ReadyForDownload ──→ Payed ──→ Closed
//!        │                                │                        │
//!        └──reject / timeout──→ Arbitrating ←──── dispute ─────────┘
//!                                         └─ handoff failed ──→ Failed
//! ```
//!
//! ## Guarantees
//!
//! - A ledger event at or before a machine's last applied position is a
//!   duplicate and changes nothing.
//! - Late triggers (source state already passed) are no-ops; early ones are
//!   reported as `InvalidTransition` anomalies.
//! - `Buying → ReadyForDownload` needs the key handoff's verified buyer
//!   ciphertext, and the on-chain ciphertext must equal it.
//! - Every applied transition, dropped event and terminal failure produces
//!   exactly one notification.
//! - A handler failure marks the transaction degraded; it never stops the
//!   scan.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::InMemoryContentStore;
pub use domain::{
    Applied, Effect, ListingBook, MachineHandle, Stamp, TransactionRegistry,
    TransactionStateMachine, Transition, Trigger,
};
pub use error::{ContentError, LifecycleError, LifecycleResult};
pub use ports::{ContentStore, LifecycleApi, PublishRequest};
pub use service::{EngineConfig, EngineSnapshot, LifecycleEngine, MAX_CREDIT, SNAPSHOT_VERSION};
