//! # Adapters Layer
//!
//! Cursor stores and an in-process ledger.

mod cursor_store;
mod memory_ledger;

pub use cursor_store::{FileCursorStore, InMemoryCursorStore};
pub use memory_ledger::InMemoryLedger;
