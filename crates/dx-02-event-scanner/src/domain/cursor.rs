//! Scan cursor
//!
//! The monotonic watermark of a scan: the next block to request and the
//! position of the last log handed downstream.

use serde::{Deserialize, Serialize};
use shared_types::{BlockNumber, LogPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    /// Last log position delivered. Logs at or before it are skipped.
    pub last_delivered: Option<LogPosition>,
    /// First block not yet scanned.
    pub next_block: BlockNumber,
}

impl ScanCursor {
    pub fn starting_at(block: BlockNumber) -> Self {
        Self {
            last_delivered: None,
            next_block: block,
        }
    }

    pub fn already_delivered(&self, position: &LogPosition) -> bool {
        self.last_delivered
            .map(|last| *position <= last)
            .unwrap_or(false)
    }

    /// Record a delivered log. Never moves backwards.
    pub fn deliver(&mut self, position: LogPosition) {
        if !self.already_delivered(&position) {
            self.last_delivered = Some(position);
        }
    }

    /// Mark every block up to `to` as scanned. Never moves backwards.
    pub fn complete_through(&mut self, to: BlockNumber) {
        self.next_block = self.next_block.max(to.saturating_add(1));
    }

    /// Highest block known to be fully scanned.
    pub fn scanned_through(&self) -> Option<BlockNumber> {
        self.next_block.checked_sub(1)
    }
}
