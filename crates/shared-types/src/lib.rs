//! # Shared Types Crate
//!
//! Domain entities and ledger primitives shared by every subsystem of the
//! data exchange.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Addresses, identifiers, raw logs and decoded
//!   ledger events are defined once, here.
//! - **Immutable Events**: A `LedgerEvent` is produced once per log entry and
//!   never mutated afterwards.
//! - **Explicit Identity**: Every per-transaction structure is keyed by its
//!   `TransactionId`; nothing relies on a shared "current transaction".

pub mod entities;
pub mod errors;
pub mod ledger;
pub mod retry;
pub mod state;

pub use entities::*;
pub use errors::*;
pub use ledger::*;
pub use retry::{Exhausted, RetryPolicy};
pub use state::TxState;
