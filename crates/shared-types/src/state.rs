//! # Business Transaction State
//!
//! ```text
//! Pending ──created──→ Created ──votes approve──→ Voted ──buy──→ Buying
//!                         │                                       │
//!                         └──reject/timeout──→ Arbitrating        ├──handoff failed──→ Failed
//!                                                 │               │
//!                                                 │        ReadyForDownload ──confirm──→ Payed ──close──→ Closed
//!                                                 ├──approve──→ Payed
//!                                                 └──reject───→ Closed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a business transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TxState {
    /// Prepare-to-buy submitted; ledger id not known yet.
    #[default]
    Pending,
    Created,
    Voted,
    Buying,
    ReadyForDownload,
    Arbitrating,
    Payed,
    Closed,
    /// Terminal failure (key handoff failed).
    Failed,
}

impl TxState {
    /// Position in the lifecycle. A trigger whose source state ranks below the
    /// current state has already been applied.
    pub fn rank(&self) -> u8 {
        match self {
            TxState::Pending => 0,
            TxState::Created => 1,
            TxState::Voted => 2,
            TxState::Buying => 3,
            TxState::ReadyForDownload => 4,
            TxState::Arbitrating => 5,
            TxState::Payed => 6,
            TxState::Closed => 7,
            TxState::Failed => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Closed | TxState::Failed)
    }

    /// State code carried by protocol contract events (`uint8 state`).
    pub fn from_ledger_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TxState::Created),
            2 => Some(TxState::Voted),
            3 => Some(TxState::Buying),
            4 => Some(TxState::ReadyForDownload),
            5 => Some(TxState::Arbitrating),
            6 => Some(TxState::Payed),
            7 => Some(TxState::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Pending => "Pending",
            TxState::Created => "Created",
            TxState::Voted => "Voted",
            TxState::Buying => "Buying",
            TxState::ReadyForDownload => "ReadyForDownload",
            TxState::Arbitrating => "Arbitrating",
            TxState::Payed => "Payed",
            TxState::Closed => "Closed",
            TxState::Failed => "Failed",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
