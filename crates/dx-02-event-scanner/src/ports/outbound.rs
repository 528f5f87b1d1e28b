//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The scanner also consumes `shared_types::LedgerClient`.

use crate::domain::ScanCursor;
use crate::error::ScanResult;

/// Persistent home of the scan cursor.
pub trait CursorStore: Send + Sync {
    fn load(&self) -> ScanResult<Option<ScanCursor>>;

    fn save(&self, cursor: &ScanCursor) -> ScanResult<()>;
}
