//! Cursor store adapters

use crate::domain::ScanCursor;
use crate::error::{ScanError, ScanResult};
use crate::ports::CursorStore;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cursor held in memory. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursor: Mutex<Option<ScanCursor>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: ScanCursor) -> Self {
        Self {
            cursor: Mutex::new(Some(cursor)),
        }
    }

    /// Overwrite the stored cursor (rewinds included).
    pub fn set(&self, cursor: ScanCursor) {
        *self.cursor.lock() = Some(cursor);
    }
}

impl CursorStore for InMemoryCursorStore {
    fn load(&self) -> ScanResult<Option<ScanCursor>> {
        Ok(*self.cursor.lock())
    }

    fn save(&self, cursor: &ScanCursor) -> ScanResult<()> {
        *self.cursor.lock() = Some(*cursor);
        Ok(())
    }
}

/// Cursor persisted as JSON. Writes go to a sibling temp file first and are
/// renamed into place.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> ScanResult<Option<ScanCursor>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ScanError::CursorStore(format!("{}: {}", self.path.display(), e))),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| ScanError::CursorStore(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, cursor: &ScanCursor) -> ScanResult<()> {
        let json = serde_json::to_vec_pretty(cursor)
            .map_err(|e| ScanError::CursorStore(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ScanError::CursorStore(e.to_string()))?;
        }
        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| ScanError::CursorStore(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| ScanError::CursorStore(e.to_string()))?;
        debug!(next_block = cursor.next_block, "Scan cursor saved");
        Ok(())
    }
}
