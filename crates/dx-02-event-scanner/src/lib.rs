//! # dx-02-event-scanner
//!
//! Produces a lazy, ordered stream of decoded events from the known
//! contract set, starting at a given block.
//!
//! ## Overview
//!
//! ```text
//!             ┌────────────── poll ──────────────┐
//!             ▼                                  │
//! LedgerClient.block_number() ──→ safe = head - confirmations
//!             │
//!             ▼
//! get_logs(next_block ..= min(safe, next_block + batch - 1))
//!             │  sort by (block, log_index)
//!             │  drop removed, drop position <= last_delivered
//!             ▼
//! EventDecoder.decode() ──→ ScanItem::Event ──→ ScanStream
//!             │  (failures ──→ ScanItem::Undecodable)
//!             │
//!             └──→ ScanItem::Finalized(to) + CursorStore.save()
//! ```
//!
//! ## Guarantees
//!
//! - Events arrive in `(block, log_index)` order, each at most once per run.
//! - Only blocks with `confirmations` blocks on top are scanned.
//! - The cursor is saved after every batch; a restart resumes from it.
//! - Transient ledger errors are retried with backoff. When the budget is
//!   spent `ScanItem::Fatal(ScanUnavailable)` is the last item.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{FileCursorStore, InMemoryCursorStore, InMemoryLedger};
pub use domain::ScanCursor;
pub use error::{ScanError, ScanResult};
pub use ports::CursorStore;
pub use service::{EventScanner, ScanConfig, ScanHandle, ScanItem, ScanStream};
