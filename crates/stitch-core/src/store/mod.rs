//! Aggregate server store.
//!
//! One JSON document, independent of the native target files, remembering which
//! servers stitch configured and where:
//!
//! ```json
//! { "version": 1, "servers": { "<id>": { "spec": {...}, "targets": [...], "updatedAt": "..." } } }
//! ```
//!
//! Every write holds the sibling `.lock` file for the whole read-modify-write, backs the
//! current file up to `.bak.<timestamp>` and replaces it atomically. The lock is
//! released on every path, including failures.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StitchError;
use crate::fs::{BackupRecord, BackupStyle, FileLock, atomic_write, read_optional};
use crate::mcp::ServerSpec;

pub const STORE_VERSION: u32 = 1;
pub const STORE_FILE_NAME: &str = "servers.json";
pub const DEFAULT_STALE_LOCK: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredServer {
    pub spec: ServerSpec,
    pub targets: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub version: u32,
    #[serde(default)]
    pub servers: BTreeMap<String, StoredServer>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            servers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnifiedStore {
    path: PathBuf,
    stale_after: Option<Duration>,
}

impl UnifiedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_after: Some(DEFAULT_STALE_LOCK),
        }
    }

    /// Age after which a leftover lock file is considered abandoned. `None` never reclaims.
    pub fn with_stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// `<config dir>/stitch/servers.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stitch").join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store. A missing or blank file is an empty store.
    pub fn load(&self) -> Result<StoreDocument, StitchError> {
        let bytes = match read_optional(&self.path)? {
            Some(bytes) => bytes,
            None => return Ok(StoreDocument::default()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(StoreDocument::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| StitchError::Parse {
            path: self.path.clone(),
            format: "JSON",
            message: e.to_string(),
        })
    }

    /// Replace the store with `document`. Returns the backup of the previous file.
    pub fn save(&self, document: &StoreDocument) -> Result<Option<PathBuf>, StitchError> {
        let _lock = FileLock::acquire(&self.path, self.stale_after)?;
        self.write_locked(document)
    }

    /// Load, modify and save under a single lock.
    pub fn update<F>(&self, modify: F) -> Result<StoreDocument, StitchError>
    where
        F: FnOnce(&mut StoreDocument),
    {
        let _lock = FileLock::acquire(&self.path, self.stale_after)?;
        let mut document = self.load()?;
        modify(&mut document);
        self.write_locked(&document)?;
        Ok(document)
    }

    /// Remember that `spec` is configured in `targets`, merging with earlier records.
    pub fn record(&self, spec: &ServerSpec, targets: &[String]) -> Result<(), StitchError> {
        if targets.is_empty() {
            return Ok(());
        }
        self.update(|document| {
            let previous = document
                .servers
                .remove(&spec.id)
                .map(|stored| stored.targets)
                .unwrap_or_default();
            let mut merged = previous;
            for target in targets {
                if !merged.contains(target) {
                    merged.push(target.clone());
                }
            }
            document.servers.insert(
                spec.id.clone(),
                StoredServer {
                    spec: spec.clone(),
                    targets: merged,
                    updated_at: Utc::now(),
                },
            );
        })?;
        info!(server = %spec.id, store = %self.path.display(), "recorded server");
        Ok(())
    }

    /// Drop `targets` from the record for `id`; `None` drops the whole record.
    ///
    /// A record left without targets is removed. Returns whether anything changed.
    pub fn forget(&self, id: &str, targets: Option<&[String]>) -> Result<bool, StitchError> {
        let mut changed = false;
        self.update(|document| {
            let Some(stored) = document.servers.get_mut(id) else {
                return;
            };
            match targets {
                Some(targets) => {
                    let before = stored.targets.len();
                    stored.targets.retain(|t| !targets.contains(t));
                    changed = stored.targets.len() != before;
                    if stored.targets.is_empty() {
                        document.servers.remove(id);
                    } else if changed {
                        stored.updated_at = Utc::now();
                    }
                }
                None => {
                    document.servers.remove(id);
                    changed = true;
                }
            }
        })?;
        debug!(server = id, changed, "forgot server");
        Ok(changed)
    }

    fn write_locked(&self, document: &StoreDocument) -> Result<Option<PathBuf>, StitchError> {
        let mut bytes = serde_json::to_vec_pretty(document).map_err(|e| StitchError::Serialize {
            format: "JSON",
            message: e.to_string(),
        })?;
        bytes.push(b'\n');

        let backup = if self.path.is_file() {
            Some(BackupRecord::create(&self.path, BackupStyle::Store)?)
        } else {
            None
        };
        atomic_write(&self.path, &bytes)?;
        Ok(backup.map(|record| record.backup_path))
    }
}
