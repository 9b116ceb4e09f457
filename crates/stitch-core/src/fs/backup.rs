//! Backup records and pre-write snapshots.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::{atomic_write, backup_timestamp, with_suffix};
use crate::error::{StitchError, io_error};

/// Naming scheme for backup files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStyle {
    /// `<path>.backup-<timestamp>`, used for native target files.
    Target,
    /// `<path>.bak.<timestamp>`, used for the aggregate store.
    Store,
}

impl BackupStyle {
    fn suffix(&self, stamp: &str) -> String {
        match self {
            BackupStyle::Target => format!(".backup-{}", stamp),
            BackupStyle::Store => format!(".bak.{}", stamp),
        }
    }
}

/// A verbatim copy of a file taken immediately before it was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
}

impl BackupRecord {
    /// Copy `original` to a timestamp-suffixed sibling. Existing backups are never
    /// overwritten; a numeric suffix is appended on collision.
    pub fn create(original: &Path, style: BackupStyle) -> Result<Self, StitchError> {
        let timestamp = Utc::now();
        let stamp = backup_timestamp(timestamp);
        let base = with_suffix(original, &style.suffix(&stamp));

        let mut backup_path = base.clone();
        let mut attempt = 1u32;
        while backup_path.exists() {
            backup_path = with_suffix(&base, &format!("-{}", attempt));
            attempt += 1;
        }

        let size_bytes = fs::copy(original, &backup_path).map_err(io_error(&backup_path))?;
        debug!(
            original = %original.display(),
            backup = %backup_path.display(),
            size_bytes,
            "created backup"
        );

        Ok(Self {
            original_path: original.to_path_buf(),
            backup_path,
            timestamp,
            size_bytes,
        })
    }

    /// Copy the backup content back over the original path.
    pub fn restore(&self) -> Result<(), StitchError> {
        let bytes = fs::read(&self.backup_path).map_err(io_error(&self.backup_path))?;
        atomic_write(&self.original_path, &bytes)
    }

    /// Delete the backup file; used when a backup was consumed or never needed.
    pub fn discard(&self) {
        if let Err(err) = fs::remove_file(&self.backup_path) {
            debug!(backup = %self.backup_path.display(), error = %err, "could not remove backup");
        }
    }
}

/// Pre-write state of a single file, sufficient to undo one mutation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    /// File content before the write, `None` if the file did not exist.
    pub original: Option<Vec<u8>>,
    pub backup: Option<BackupRecord>,
}

impl Snapshot {
    pub fn backup_path(&self) -> Option<PathBuf> {
        self.backup.as_ref().map(|b| b.backup_path.clone())
    }

    /// Put the file back the way it was.
    ///
    /// Prefers the on-disk backup (which is consumed), falls back to the in-memory
    /// copy, and deletes a file that did not exist before. Returns the backup path
    /// that was restored from, if any.
    pub fn restore(&self) -> Result<Option<PathBuf>, StitchError> {
        if let Some(backup) = &self.backup {
            match backup.restore() {
                Ok(()) => {
                    backup.discard();
                    return Ok(Some(backup.backup_path.clone()));
                }
                Err(err) if self.original.is_some() => {
                    warn!(
                        backup = %backup.backup_path.display(),
                        error = %err,
                        "backup restore failed; using in-memory copy"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        match &self.original {
            Some(bytes) => atomic_write(&self.path, bytes)?,
            None => match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StitchError::Io {
                        path: self.path.clone(),
                        source,
                    });
                }
            },
        }
        Ok(None)
    }
}
