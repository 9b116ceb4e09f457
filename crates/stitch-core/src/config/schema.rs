//! Configuration schema for stitch.toml
//!
//! ```toml
//! [orchestrator]
//! timeout_ms = 10000
//! sequential = false
//!
//! [bridge]
//! package = "mcp-stdio-bridge"
//! version = "0.3.2"
//! container_runtime = "docker"
//!
//! [store]
//! stale_lock_secs = 600
//!
//! [targets]
//! disabled = ["vscode"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::bridge::{
    BridgeOptions, DEFAULT_BRIDGE_IMAGE, DEFAULT_BRIDGE_PACKAGE, DEFAULT_BRIDGE_VERSION,
    default_install_dir,
};
use crate::client::BUILTIN_TARGET_IDS;
use crate::orchestration::{DispatchMode, OrchestratorOptions};
use crate::store::UnifiedStore;

/// Root configuration structure for stitch.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StitchConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub bridge: BridgeSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub targets: TargetsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Per-target call budget in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Dispatch one target at a time (diagnostics)
    #[serde(default)]
    pub sequential: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            sequential: false,
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSection {
    #[serde(default = "default_bridge_package")]
    pub package: String,

    /// Exact semver pin of the bridge package and image tag
    #[serde(default = "default_bridge_version")]
    pub version: String,

    #[serde(default = "default_bridge_image")]
    pub image: String,

    /// Container runtime (docker, podman); selects the container strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_runtime: Option<String>,

    #[serde(default)]
    pub prefer_local_install: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            package: default_bridge_package(),
            version: default_bridge_version(),
            image: default_bridge_image(),
            container_runtime: None,
            prefer_local_install: false,
            install_dir: None,
        }
    }
}

fn default_bridge_package() -> String {
    DEFAULT_BRIDGE_PACKAGE.to_string()
}

fn default_bridge_version() -> String {
    DEFAULT_BRIDGE_VERSION.to_string()
}

fn default_bridge_image() -> String {
    DEFAULT_BRIDGE_IMAGE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Aggregate store location (default: <config dir>/stitch/servers.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Lock files older than this are reclaimed; 0 disables reclamation
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: None,
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

fn default_stale_lock_secs() -> u64 {
    600
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TargetsSection {
    /// Target ids never touched by batch operations
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl StitchConfig {
    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.orchestrator.timeout_ms == 0 {
            anyhow::bail!("orchestrator.timeout_ms must be greater than zero");
        }
        if self.bridge.package.trim().is_empty() {
            anyhow::bail!("bridge.package cannot be empty");
        }
        semver::Version::parse(&self.bridge.version).with_context(|| {
            format!(
                "bridge.version '{}' must be an exact semver version",
                self.bridge.version
            )
        })?;
        for id in &self.targets.disabled {
            if !BUILTIN_TARGET_IDS.contains(&id.as_str()) {
                anyhow::bail!(
                    "Unknown target '{}' in targets.disabled (known: {})",
                    id,
                    BUILTIN_TARGET_IDS.join(", ")
                );
            }
        }
        Ok(())
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            call_timeout: Duration::from_millis(self.orchestrator.timeout_ms),
            dispatch: if self.orchestrator.sequential {
                DispatchMode::Sequential
            } else {
                DispatchMode::Concurrent
            },
        }
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            package: self.bridge.package.clone(),
            version: self.bridge.version.clone(),
            image: self.bridge.image.clone(),
            container_runtime: self.bridge.container_runtime.clone(),
            prefer_local_install: self.bridge.prefer_local_install,
        }
    }

    pub fn bridge_install_dir(&self) -> Option<PathBuf> {
        self.bridge.install_dir.clone().or_else(default_install_dir)
    }

    /// The aggregate store described by `[store]`, if a location can be resolved.
    pub fn unified_store(&self) -> Option<UnifiedStore> {
        let path = self.store.path.clone().or_else(UnifiedStore::default_path)?;
        let stale_after = match self.store.stale_lock_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Some(UnifiedStore::new(path).with_stale_after(stale_after))
    }
}
