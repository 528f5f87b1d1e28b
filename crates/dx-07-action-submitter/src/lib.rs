//! # dx-07-action-submitter
//!
//! Builds, signs and submits the ledger transactions behind every user
//! action, without ever submitting the same logical action twice while one
//! is in flight.
//!
//! ## Overview
//!
//! ```text
//! submit(actor, action)
//!     │
//!     ├── key in flight? ──yes──→ AlreadyPending (no ledger call)
//!     │
//!     ├── reserve key, take nonce
//!     ├── Signer.sign(bincode(unsigned))
//!     ├── LedgerClient.submit_signed_transaction(bincode(signed))
//!     │        └── Unavailable → retry with backoff
//!     │
//!     └── Pending { tx_hash } ──confirm(key)──→ released
//!                              ──reconcile(): receipt Failed──→ released
//! ```
//!
//! An `ActionKey` is (actor, action kind, business scope), so two votes on
//! the same transaction by the same verifier share a key while votes on
//! different transactions do not.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::DevSigner;
pub use domain::{Action, ActionKey, ActionKind, ActionScope, SignedTransaction, UnsignedTransaction};
pub use error::{SignerError, SubmissionError, SubmissionResult};
pub use ports::{ActionApi, Signer};
pub use service::{ActionSubmitter, ReceiptUpdate, Submission, SubmitterConfig};
