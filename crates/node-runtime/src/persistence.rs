//! # Lifecycle Persistence
//!
//! The data directory holds the scan cursor (`cursor.json`, written by the
//! scanner) and the lifecycle snapshot (`transactions.json`). An exclusive
//! lock on `<data_dir>/LOCK` keeps a second node off the same directory.

use anyhow::{Context, Result};
use dx_02_event_scanner::{CursorStore, FileCursorStore, ScanCursor};
use dx_04_transaction_lifecycle::EngineSnapshot;
use fs2::FileExt;
use shared_types::BlockNumber;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Owns the data directory for the lifetime of the node.
pub struct DataDir {
    root: PathBuf,
    /// Held open; the lock is released when it is dropped.
    lock: File,
}

impl DataDir {
    /// Create the directory if needed and take its lock.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create data directory {}", root.display()))?;
        let lock_path = root.join("LOCK");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;
        lock.try_lock_exclusive().with_context(|| {
            format!("Data directory {} is in use by another node", root.display())
        })?;
        info!(data_dir = %root.display(), "Data directory locked");
        Ok(Self {
            root: root.to_path_buf(),
            lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cursor_store(&self) -> FileCursorStore {
        FileCursorStore::new(self.root.join("cursor.json"))
    }

    fn snapshot_path(&self) -> PathBuf {
        self.root.join("transactions.json")
    }

    pub fn load_snapshot(&self) -> Result<Option<EngineSnapshot>> {
        let path = self.snapshot_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let snapshot = EngineSnapshot::from_json(&raw)
            .with_context(|| format!("Corrupt lifecycle snapshot {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Write-then-rename, so a crash leaves the previous snapshot intact.
    pub fn save_snapshot(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let path = self.snapshot_path();
        let tmp = self.root.join("transactions.json.tmp");
        let json = snapshot.to_json().context("Failed to encode lifecycle snapshot")?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;
        debug!(
            block = snapshot.block,
            active = snapshot.active.len(),
            "Lifecycle snapshot saved"
        );
        Ok(())
    }

    /// Move the scan cursor back so events after `snapshot_block` are scanned
    /// again. A cursor ahead of the snapshot means a crash lost engine state
    /// the replay restores; replayed events older than a machine's last
    /// applied position change nothing.
    pub fn rewind_cursor(
        &self,
        snapshot_block: Option<BlockNumber>,
        start_block: BlockNumber,
    ) -> Result<()> {
        let store = self.cursor_store();
        let Some(cursor) = store.load().context("Failed to load scan cursor")? else {
            return Ok(());
        };
        let resume_at = match snapshot_block {
            Some(block) => block.saturating_add(1).max(start_block),
            None => start_block,
        };
        if cursor.next_block <= resume_at {
            return Ok(());
        }
        warn!(
            cursor = cursor.next_block,
            resume_at, "Scan cursor ahead of the lifecycle snapshot, rescanning"
        );
        store
            .save(&ScanCursor::starting_at(resume_at))
            .context("Failed to rewind scan cursor")?;
        Ok(())
    }
}

impl Drop for DataDir {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock) {
            warn!(error = %e, "Failed to unlock data directory");
        }
    }
}
