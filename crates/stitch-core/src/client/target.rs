//! The capability contract every target implements, and its file-backed implementation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{TargetAdapter, TargetCapabilities, TargetContext, TargetDescriptor};
use crate::config::client_config::{
    ConfigSerializer, FormatError, map_at_path, map_at_path_mut, remove_preserving_order,
    serializer_for_format,
};
use crate::config::mutation::{ParsePolicy, SafeMutation};
use crate::error::StitchError;
use crate::fs::Snapshot;
use crate::mcp::ServerSpec;

/// Uniform contract the orchestrator drives.
pub trait ConfigTarget: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> TargetDescriptor;

    fn id(&self) -> &str;

    fn capabilities(&self) -> TargetCapabilities;

    /// Best-known file location; an override directory always wins. Never fails, and
    /// may name a file that does not exist yet.
    fn detect(&self, override_dir: Option<&Path>) -> Option<PathBuf>;

    /// Whether the tool appears to be installed on this machine.
    fn is_present(&self) -> bool;

    /// Upsert `spec` keyed by its id. Returns the backup path when one was taken.
    fn configure(&self, spec: &ServerSpec, backup: bool) -> Result<Option<PathBuf>, StitchError>;

    /// Delete the entry for `spec.id`; `NotFound` if there is none.
    fn remove(&self, spec: &ServerSpec, backup: bool) -> Result<Option<PathBuf>, StitchError>;

    fn list_servers(&self, override_dir: Option<&Path>) -> Vec<String>;

    fn has_server(&self, id: &str, override_dir: Option<&Path>) -> bool {
        self.list_servers(override_dir).iter().any(|s| s == id)
    }

    fn get_server(&self, _id: &str, _override_dir: Option<&Path>) -> Option<ServerSpec> {
        None
    }

    fn validate(&self) -> bool {
        true
    }

    /// Undo this target's most recent successful mutation.
    fn rollback(&self) -> Result<Option<PathBuf>, StitchError> {
        Ok(None)
    }
}

/// Best-effort reads: a failure is logged and becomes the empty value.
pub fn degrade_to_empty<T: Default>(
    target_id: &str,
    operation: &'static str,
    result: Result<T, StitchError>,
) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(target_id, operation, error = %err, "degrading to empty result");
            T::default()
        }
    }
}

/// A target whose configuration is one document on disk.
#[derive(Debug)]
pub struct FileTarget {
    adapter: Box<dyn TargetAdapter>,
    ctx: TargetContext,
    serializer: Box<dyn ConfigSerializer>,
    // Serializes mutations against this target's file within the process.
    io_lock: Mutex<()>,
    last_mutation: Mutex<Option<Snapshot>>,
}

impl FileTarget {
    pub fn new(adapter: Box<dyn TargetAdapter>, ctx: TargetContext) -> Self {
        let serializer = serializer_for_format(adapter.format());
        Self {
            adapter,
            ctx,
            serializer,
            io_lock: Mutex::new(()),
            last_mutation: Mutex::new(None),
        }
    }

    pub fn adapter(&self) -> &dyn TargetAdapter {
        self.adapter.as_ref()
    }

    fn resolve_path(&self) -> Result<PathBuf, StitchError> {
        self.detect(None).ok_or_else(|| {
            StitchError::precondition(self.id(), "no configuration path is known for this platform")
        })
    }

    fn parse_error(&self, path: &Path, err: FormatError) -> StitchError {
        StitchError::Parse {
            path: path.to_path_buf(),
            format: self.serializer.format().as_str(),
            message: err.0,
        }
    }

    fn usable(&self, path: &Path) -> bool {
        path.is_file() && self.serializer.load(path).is_ok()
    }

    fn read_servers(&self, override_dir: Option<&Path>) -> Result<Map<String, Value>, StitchError> {
        let path = self.resolve_override(override_dir)?;
        let document = self.serializer.load(&path)?;
        let servers = map_at_path(&document, self.adapter.servers_path())
            .map_err(|e| self.parse_error(&path, e))?;
        Ok(servers.cloned().unwrap_or_default())
    }

    fn resolve_override(&self, override_dir: Option<&Path>) -> Result<PathBuf, StitchError> {
        match override_dir {
            Some(_) => self.detect(override_dir).ok_or_else(|| {
                StitchError::precondition(self.id(), "no configuration path could be resolved")
            }),
            None => self.resolve_path(),
        }
    }

    fn expect_entry(&self, document: &Map<String, Value>, id: &str) -> Result<(), String> {
        let servers = map_at_path(document, self.adapter.servers_path())
            .map_err(|e| e.0)?
            .ok_or_else(|| format!("'{}' is missing", self.adapter.servers_path().join(".")))?;
        let entry = servers
            .get(id)
            .ok_or_else(|| format!("entry '{}' is missing", id))?;
        self.adapter
            .check_entry(entry)
            .map_err(|message| format!("entry '{}': {}", id, message))
    }

    fn expect_absent(&self, document: &Map<String, Value>, id: &str) -> Result<(), String> {
        let servers = map_at_path(document, self.adapter.servers_path()).map_err(|e| e.0)?;
        match servers {
            Some(servers) if servers.contains_key(id) => {
                Err(format!("entry '{}' is still present", id))
            }
            _ => Ok(()),
        }
    }

    fn forget_last_mutation(&self) {
        *self
            .last_mutation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn remember(&self, snapshot: Snapshot) -> Option<PathBuf> {
        let backup_path = snapshot.backup_path();
        *self
            .last_mutation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        backup_path
    }
}

impl ConfigTarget for FileTarget {
    fn descriptor(&self) -> TargetDescriptor {
        TargetDescriptor {
            id: self.adapter.id().to_string(),
            display_name: self.adapter.display_name().to_string(),
            write_mode: self.adapter.write_mode(),
        }
    }

    fn id(&self) -> &str {
        self.adapter.id()
    }

    fn capabilities(&self) -> TargetCapabilities {
        self.adapter.capabilities()
    }

    fn detect(&self, override_dir: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = override_dir.or(self.ctx.override_dir.as_deref()) {
            return Some(dir.join(self.adapter.file_name()));
        }
        let candidates = self.adapter.candidate_paths(&self.ctx);
        candidates
            .iter()
            .find(|path| self.usable(path))
            .or_else(|| candidates.first())
            .cloned()
    }

    fn is_present(&self) -> bool {
        let file_exists = self.detect(None).is_some_and(|path| path.exists());
        file_exists
            || self
                .adapter
                .footprint(&self.ctx)
                .is_some_and(|dir| dir.is_dir())
    }

    fn configure(&self, spec: &ServerSpec, backup: bool) -> Result<Option<PathBuf>, StitchError> {
        self.forget_last_mutation();
        spec.validate()
            .map_err(|e| StitchError::precondition(self.id(), e.to_string()))?;

        let capabilities = self.adapter.capabilities();
        if !capabilities.supports(spec.transport) {
            let hint = if capabilities.needs_bridge(spec) {
                "; bridge it to a local stdio process first"
            } else {
                ""
            };
            return Err(StitchError::precondition(
                self.id(),
                format!("{} transport is not supported{}", spec.transport, hint),
            ));
        }

        let entry = self.adapter.render_entry(spec)?;
        let path = self.resolve_path()?;
        let servers_path = self.adapter.servers_path();

        let _guard = self.io_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = SafeMutation::new(&path, self.serializer.as_ref())
            .with_backup(backup)
            .with_policy(ParsePolicy::Lenient)
            .with_validator(|document| self.expect_entry(document, &spec.id))
            .apply(|document| {
                let servers = map_at_path_mut(document, servers_path, true)
                    .map_err(|e| self.parse_error(&path, e))?
                    .ok_or_else(|| {
                        StitchError::precondition(self.id(), "server map could not be created")
                    })?;
                servers.insert(spec.id.clone(), entry);
                Ok(())
            })?;

        info!(target_id = self.id(), server = %spec.id, path = %path.display(), "configured server");
        Ok(self.remember(snapshot))
    }

    fn remove(&self, spec: &ServerSpec, backup: bool) -> Result<Option<PathBuf>, StitchError> {
        self.forget_last_mutation();
        spec.validate_id()
            .map_err(|e| StitchError::precondition(self.id(), e.to_string()))?;

        let path = self.resolve_path()?;
        let servers_path = self.adapter.servers_path();

        let _guard = self.io_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = SafeMutation::new(&path, self.serializer.as_ref())
            .with_backup(backup)
            .with_policy(ParsePolicy::Strict)
            .with_validator(|document| self.expect_absent(document, &spec.id))
            .apply(|document| {
                let removed = map_at_path_mut(document, servers_path, false)
                    .map_err(|e| self.parse_error(&path, e))?
                    .and_then(|servers| remove_preserving_order(servers, &spec.id));
                match removed {
                    Some(_) => Ok(()),
                    None => Err(StitchError::NotFound {
                        id: spec.id.clone(),
                        path: path.clone(),
                    }),
                }
            })?;

        info!(target_id = self.id(), server = %spec.id, path = %path.display(), "removed server");
        Ok(self.remember(snapshot))
    }

    fn list_servers(&self, override_dir: Option<&Path>) -> Vec<String> {
        let servers = self
            .read_servers(override_dir)
            .map(|servers| servers.keys().cloned().collect());
        degrade_to_empty(self.id(), "list", servers)
    }

    fn get_server(&self, id: &str, override_dir: Option<&Path>) -> Option<ServerSpec> {
        let server = self.read_servers(override_dir).map(|servers| {
            servers
                .get(id)
                .and_then(|entry| self.adapter.parse_entry(id, entry))
        });
        degrade_to_empty(self.id(), "get", server)
    }

    fn validate(&self) -> bool {
        let path = match self.detect(None) {
            Some(path) if path.exists() => path,
            _ => return true,
        };
        let servers = match self.read_servers(None) {
            Ok(servers) => servers,
            Err(err) => {
                warn!(target_id = self.id(), error = %err, "configuration is invalid");
                return false;
            }
        };
        for (id, entry) in &servers {
            if let Err(message) = self.adapter.check_entry(entry) {
                warn!(
                    target_id = self.id(),
                    path = %path.display(),
                    server = %id,
                    %message,
                    "server entry is malformed"
                );
                return false;
            }
        }
        true
    }

    fn rollback(&self) -> Result<Option<PathBuf>, StitchError> {
        let snapshot = self
            .last_mutation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(snapshot) = snapshot else {
            debug!(target_id = self.id(), "nothing to roll back");
            return Ok(None);
        };

        let _guard = self.io_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let restored = snapshot.restore()?;
        info!(target_id = self.id(), path = %snapshot.path.display(), "rolled back last change");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::claude_code::ClaudeCodeAdapter;
    use crate::client::Platform;
    use crate::mcp::Transport;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn target(tmp: &TempDir) -> FileTarget {
        let ctx = TargetContext::new(
            tmp.path().join("home"),
            tmp.path().join("config"),
            Platform::Linux,
        );
        FileTarget::new(Box::new(ClaudeCodeAdapter), ctx)
    }

    fn config_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join("home/.claude.json")
    }

    #[test]
    fn detect_returns_intended_path_when_missing() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let target = target(&tmp);

        assert_eq!(target.detect(None), Some(config_path(&tmp)));
        assert!(!target.is_present());
    }

    #[test]
    fn detect_prefers_override_dir() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let target = target(&tmp);
        let dir = tmp.path().join("override");

        assert_eq!(target.detect(Some(&dir)), Some(dir.join(".claude.json")));
    }

    #[test]
    fn configure_preserves_unrelated_keys() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let target = target(&tmp);
        let path = config_path(&tmp);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, r#"{"numStartups": 12, "mcpServers": {"old": {"command": "a"}}}"#)
            .expect("write");

        target
            .configure(&ServerSpec::stdio("new", "npx", vec!["-y".into(), "pkg".into()]), false)
            .expect("configure should succeed");

        let written: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(written["numStartups"], json!(12));
        assert_eq!(written["mcpServers"]["old"], json!({"command": "a"}));
        assert_eq!(written["mcpServers"]["new"]["command"], json!("npx"));
    }

    #[test]
    fn invalid_spec_is_precondition_and_file_untouched() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let target = target(&tmp);
        let path = config_path(&tmp);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "{\"a\":1}").expect("write");

        let mut spec = ServerSpec::remote("r", Transport::Http, "http://x/y");
        spec.command = Some("npx".to_string());
        let err = target.configure(&spec, true).expect_err("should fail");

        assert!(matches!(err, StitchError::Precondition { .. }));
        assert_eq!(fs::read_to_string(&path).expect("read"), "{\"a\":1}");
    }

    #[test]
    fn remove_missing_is_not_found() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let target = target(&tmp);

        let err = target
            .remove(&ServerSpec::reference("ghost"), true)
            .expect_err("should fail");
        assert!(err.is_not_found());
        assert!(!config_path(&tmp).exists());
    }

    #[test]
    fn list_servers_degrades_on_parse_failure() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let target = target(&tmp);
        let path = config_path(&tmp);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "{ nope").expect("write");

        assert!(target.list_servers(None).is_empty());
        assert!(!target.has_server("x", None));
        assert!(!target.validate());
    }

    #[test]
    fn rollback_restores_state_before_last_call() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let target = target(&tmp);

        target
            .configure(&ServerSpec::stdio("x", "echo", vec![]), true)
            .expect("configure");
        assert!(config_path(&tmp).exists());

        target.rollback().expect("rollback");
        assert!(!config_path(&tmp).exists());
        assert_eq!(target.rollback().expect("second rollback"), None);
    }

    #[test]
    fn degrade_to_empty_returns_default_on_error() {
        let value: Vec<String> = degrade_to_empty(
            "t",
            "list",
            Err(StitchError::UnknownTarget("t".to_string())),
        );
        assert!(value.is_empty());
        assert_eq!(degrade_to_empty("t", "list", Ok(vec![1])), vec![1]);
    }
}
