//! Error types for Event Scanner

use thiserror::Error;

/// Scanner errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    /// Ledger could not be reached within the retry budget
    #[error("Ledger unavailable after {attempts} attempt(s): {last_error}")]
    ScanUnavailable { attempts: u32, last_error: String },

    /// Cursor could not be loaded or saved
    #[error("Cursor store error: {0}")]
    CursorStore(String),

    /// Scan task ended abnormally
    #[error("Scan task failed: {0}")]
    TaskFailed(String),
}

/// Result type for scanner operations
pub type ScanResult<T> = Result<T, ScanError>;
