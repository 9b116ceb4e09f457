//! Sibling lock files with create-exclusive semantics.
//!
//! The lock for `servers.json` is `servers.json.lock`. Its first line is the holder's
//! process id, its second a per-acquisition token. A lock whose modification time is
//! older than the configured staleness window is treated as abandoned by a crashed
//! holder and reclaimed once.
//!
//! Reclaiming runs under an OS lock on `servers.json.lock.reclaim` and re-checks
//! staleness there, so two reclaimers cannot both delete and recreate the lock.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use super::with_suffix;
use crate::error::{StitchError, io_error};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Held lock; the lock file is removed on drop if it is still ours.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    content: String,
}

impl FileLock {
    pub fn lock_path_for(target: &Path) -> PathBuf {
        with_suffix(target, ".lock")
    }

    /// Acquire the lock guarding `target`, failing fast with `LockContention`.
    pub fn acquire(target: &Path, stale_after: Option<Duration>) -> Result<Self, StitchError> {
        let path = Self::lock_path_for(target);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let content = format!(
            "{}\n{}",
            std::process::id(),
            NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
        );

        match try_create(&path, &content) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let Some(max_age) = stale_after.filter(|max_age| is_stale(&path, *max_age)) else {
                    return Err(contention(path));
                };
                reclaim(&path, &content, max_age)?;
            }
            Err(source) => return Err(StitchError::Io { path, source }),
        }

        debug!(lock = %path.display(), "acquired lock");
        Ok(Self { path, content })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(current) if current == self.content => {
                if let Err(err) = fs::remove_file(&self.path) {
                    warn!(lock = %self.path.display(), error = %err, "failed to release lock");
                }
            }
            Ok(_) => warn!(lock = %self.path.display(), "lock was taken over; leaving it"),
            Err(err) => warn!(lock = %self.path.display(), error = %err, "failed to release lock"),
        }
    }
}

/// Replace a stale lock with ours while holding the reclaim guard.
fn reclaim(path: &Path, content: &str, max_age: Duration) -> Result<(), StitchError> {
    let guard_path = with_suffix(path, ".reclaim");
    let guard = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&guard_path)
        .map_err(io_error(&guard_path))?;
    guard.lock_exclusive().map_err(io_error(&guard_path))?;

    let result = replace_if_stale(path, content, max_age);
    release(&guard, &guard_path);
    result
}

fn replace_if_stale(path: &Path, content: &str, max_age: Duration) -> Result<(), StitchError> {
    // Another reclaimer may have replaced it while we waited for the guard.
    if path.exists() && !is_stale(path, max_age) {
        return Err(contention(path.to_path_buf()));
    }
    warn!(
        lock = %path.display(),
        holder = ?read_holder(path),
        "reclaiming stale lock"
    );
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(StitchError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    match try_create(path, content) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(contention(path.to_path_buf()))
        }
        Err(source) => Err(StitchError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn release(guard: &File, guard_path: &Path) {
    if let Err(err) = FileExt::unlock(guard) {
        warn!(lock = %guard_path.display(), error = %err, "failed to release reclaim guard");
    }
}

fn contention(path: PathBuf) -> StitchError {
    StitchError::LockContention {
        holder: read_holder(&path),
        path,
    }
}

fn try_create(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(err) = file.write_all(content.as_bytes()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(err);
    }
    Ok(())
}

fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.lines().next()?.trim().parse().ok()
}

fn is_stale(path: &Path, max_age: Duration) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}
