//! Domain module for Action Submitter
//!
//! - action: user actions and their deduplication keys
//! - envelope: the signed transaction wire format

pub mod action;
pub mod envelope;

pub use action::{Action, ActionKey, ActionKind, ActionScope};
pub use envelope::{SignedTransaction, UnsignedTransaction};
