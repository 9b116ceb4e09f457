//! Pinned local installation of the bridge binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::client::Platform;
use crate::error::StitchError;

/// Provides an installed bridge binary for a pinned package version.
pub trait BridgeInstaller: Send + Sync + fmt::Debug {
    /// Install `package@version` if needed and return the binary path.
    fn install(&self, package: &str, version: &str) -> Result<PathBuf, StitchError>;

    fn install_root(&self) -> &Path;
}

/// Installs into `<root>/<version>` with `npm install --prefix`.
#[derive(Debug, Clone)]
pub struct NpmPrefixInstaller {
    root: PathBuf,
    host: Platform,
}

impl NpmPrefixInstaller {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host: Platform::current(),
        }
    }

    pub fn with_host(mut self, host: Platform) -> Self {
        self.host = host;
        self
    }

    pub fn prefix_for(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// `node_modules/.bin` entry for `package`, with the Windows shim suffix.
    pub fn binary_path(&self, package: &str, version: &str) -> PathBuf {
        let name = binary_name(package);
        let file = match self.host {
            Platform::Windows => format!("{}.cmd", name),
            Platform::MacOs | Platform::Linux => name.to_string(),
        };
        self.prefix_for(version)
            .join("node_modules")
            .join(".bin")
            .join(file)
    }
}

impl BridgeInstaller for NpmPrefixInstaller {
    fn install(&self, package: &str, version: &str) -> Result<PathBuf, StitchError> {
        let binary = self.binary_path(package, version);
        if binary.is_file() {
            debug!(binary = %binary.display(), "reusing installed bridge");
            return Ok(binary);
        }

        let install_error = |message: String| StitchError::BridgeInstall {
            package: package.to_string(),
            version: version.to_string(),
            message,
        };

        let prefix = self.prefix_for(version);
        std::fs::create_dir_all(&prefix).map_err(|e| install_error(e.to_string()))?;

        let npm = super::normalize_command("npm", self.host);
        info!(package, version, prefix = %prefix.display(), "installing bridge");
        let output = Command::new(&npm)
            .arg("install")
            .arg("--prefix")
            .arg(&prefix)
            .arg("--no-save")
            .arg(format!("{}@{}", package, version))
            .output()
            .map_err(|e| install_error(format!("failed to invoke {}: {}", npm, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(install_error(format!(
                "npm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        if !binary.is_file() {
            return Err(install_error(format!(
                "install finished but {} is missing",
                binary.display()
            )));
        }
        Ok(binary)
    }

    fn install_root(&self) -> &Path {
        &self.root
    }
}

/// Binary name npm links for a package: the name without its scope.
fn binary_name(package: &str) -> &str {
    package.rsplit('/').next().unwrap_or(package)
}
