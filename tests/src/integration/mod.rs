//! # Integration Tests
//!
//! Every scenario writes contract logs into an in-process ledger and lets
//! the real scanner, router and lifecycle engine pick them up.

pub mod harness;
mod replay;
mod scenarios;
