//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use stitch_core::bridge::{BridgeMapper, BridgeOptions};
use stitch_core::client::{
    ConfigTarget, Platform, TargetCapabilities, TargetContext, TargetDescriptor, TargetRegistry,
    WriteMode,
};
use stitch_core::error::StitchError;
use stitch_core::mcp::{ServerSpec, Transport};
use stitch_core::orchestration::{DispatchMode, Orchestrator, OrchestratorOptions};

/// A Linux-shaped home and config directory inside `tmp`.
pub fn context(tmp: &TempDir) -> TargetContext {
    TargetContext::new(
        tmp.path().join("home"),
        tmp.path().join("config"),
        Platform::Linux,
    )
}

pub fn default_registry(tmp: &TempDir) -> TargetRegistry {
    TargetRegistry::with_default_targets(&context(tmp))
}

pub fn orchestrator(
    registry: TargetRegistry,
    call_timeout: Duration,
    dispatch: DispatchMode,
) -> Orchestrator {
    Orchestrator::new(
        registry,
        BridgeMapper::new(BridgeOptions::default()).with_host(Platform::Linux),
        OrchestratorOptions {
            call_timeout,
            dispatch,
        },
    )
}

pub fn ids(targets: &[&str]) -> Vec<String> {
    targets.iter().map(|t| t.to_string()).collect()
}

pub fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent dir");
    fs::write(path, content).expect("write fixture");
}

/// Files in `dir` whose name contains `.bak.`
pub fn backups_in(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.to_string_lossy().contains(".bak."))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// In-memory target that sleeps before answering and records call order.
#[derive(Debug)]
pub struct ScriptedTarget {
    pub id: String,
    pub delay: Duration,
    pub write_mode: WriteMode,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub rollbacks: Arc<Mutex<u32>>,
    pub fail_configure: bool,
    pub transports: &'static [Transport],
}

impl ScriptedTarget {
    pub fn new(id: &str, delay: Duration, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            id: id.to_string(),
            delay,
            write_mode: WriteMode::File,
            calls,
            rollbacks: Arc::new(Mutex::new(0)),
            fail_configure: false,
            transports: &[Transport::Stdio, Transport::Http, Transport::Sse],
        }
    }

    fn enter(&self, operation: &str) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{}:{}", operation, self.id));
        std::thread::sleep(self.delay);
    }

    fn path(&self) -> PathBuf {
        PathBuf::from(format!("/scripted/{}.json", self.id))
    }
}

impl ConfigTarget for ScriptedTarget {
    fn descriptor(&self) -> TargetDescriptor {
        TargetDescriptor {
            id: self.id.clone(),
            display_name: self.id.clone(),
            write_mode: self.write_mode,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities {
            transports: self.transports,
        }
    }

    fn detect(&self, _override_dir: Option<&Path>) -> Option<PathBuf> {
        Some(self.path())
    }

    fn is_present(&self) -> bool {
        self.enter("detect");
        true
    }

    fn configure(&self, _spec: &ServerSpec, _backup: bool) -> Result<Option<PathBuf>, StitchError> {
        self.enter("configure");
        if self.fail_configure {
            return Err(StitchError::precondition(self.id.as_str(), "scripted failure"));
        }
        Ok(None)
    }

    fn remove(&self, spec: &ServerSpec, _backup: bool) -> Result<Option<PathBuf>, StitchError> {
        self.enter("remove");
        Err(StitchError::NotFound {
            id: spec.id.clone(),
            path: self.path(),
        })
    }

    fn list_servers(&self, _override_dir: Option<&Path>) -> Vec<String> {
        self.enter("list");
        vec![format!("{}-server", self.id)]
    }

    fn rollback(&self) -> Result<Option<PathBuf>, StitchError> {
        *self.rollbacks.lock().expect("rollbacks lock") += 1;
        Ok(None)
    }
}
