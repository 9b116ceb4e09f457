//! Filesystem primitives shared by targets and the aggregate store.

pub mod backup;
pub mod lock;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{StitchError, io_error};

pub use backup::{BackupRecord, BackupStyle, Snapshot};
pub use lock::FileLock;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` through a sibling temporary file and a rename.
///
/// Parent directories are created first. A crash mid-write leaves at most a stray
/// temporary file; `path` is either the old content or the new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StitchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let tmp_path = unique_temp_path(path)?;
    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(StitchError::Io {
            path: tmp_path,
            source,
        });
    }

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StitchError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Read a file, mapping "does not exist" to `None`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StitchError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StitchError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Timestamp used in backup names: RFC 3339 with colons and periods replaced by hyphens.
pub fn backup_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// `path` with `suffix` appended to its file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn unique_temp_path(path: &Path) -> Result<PathBuf, StitchError> {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let base = path.file_name().ok_or_else(|| StitchError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
    })?;

    for _ in 0..1000 {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            ".{}.tmp.{}.{}",
            base.to_string_lossy(),
            std::process::id(),
            n
        );
        let candidate = parent.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(StitchError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "could not find a free temporary path",
        ),
    })
}
