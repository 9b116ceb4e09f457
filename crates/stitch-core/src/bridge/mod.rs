//! Transport bridge mapper.
//!
//! Rewrites a remote-endpoint [`ServerSpec`] into a local stdio invocation of a bridge
//! process, for targets that can only launch local processes. The bridge itself is an
//! external program; this module only decides how to launch it.
//!
//! ## Strategy
//!
//! | Condition | Strategy | Invocation |
//! |-----------|----------|------------|
//! | container runtime configured | `Container` | `<runtime> run -i --rm <image>:<version> ...` |
//! | local install preferred, or Windows host, and an installer is set | `LocalInstall` | `<install dir>/.bin/<binary> ...` |
//! | otherwise | `PackageRunner` | `npx -y <package>@<version> ...` |

mod install;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::Platform;
use crate::error::StitchError;
use crate::mcp::{ServerSpec, Transport};

pub use install::{BridgeInstaller, NpmPrefixInstaller};

pub const DEFAULT_BRIDGE_PACKAGE: &str = "mcp-stdio-bridge";
pub const DEFAULT_BRIDGE_VERSION: &str = "0.3.2";
pub const DEFAULT_BRIDGE_IMAGE: &str = "ghcr.io/stitch-mcp/stdio-bridge";

/// Startup budget for invocations that may download the bridge on first run.
pub const FETCH_STARTUP_TIMEOUT_MS: u64 = 60_000;

const POSIX_CMD_SHIMS: &[&str] = &["npx", "npm", "pnpm", "yarn"];
const EXE_RUNNERS: &[&str] = &["bunx", "uvx"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    pub package: String,
    /// Exact version pin; package runners never float to `latest`.
    pub version: String,
    pub image: String,
    /// e.g. `docker` or `podman`. Setting it selects the container strategy.
    pub container_runtime: Option<String>,
    pub prefer_local_install: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            package: DEFAULT_BRIDGE_PACKAGE.to_string(),
            version: DEFAULT_BRIDGE_VERSION.to_string(),
            image: DEFAULT_BRIDGE_IMAGE.to_string(),
            container_runtime: None,
            prefer_local_install: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStrategy {
    Container,
    LocalInstall,
    PackageRunner,
}

impl BridgeStrategy {
    /// Whether the first launch may download the bridge before it can answer.
    pub fn fetches_on_first_run(&self) -> bool {
        !matches!(self, BridgeStrategy::LocalInstall)
    }
}

/// Executable specification for the bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSpec {
    pub command: String,
    pub args: Vec<String>,
    pub strategy: BridgeStrategy,
}

#[derive(Debug, Clone)]
pub struct BridgeMapper {
    options: BridgeOptions,
    host: Platform,
    installer: Option<Arc<dyn BridgeInstaller>>,
}

impl BridgeMapper {
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            options,
            host: Platform::current(),
            installer: None,
        }
    }

    pub fn with_host(mut self, host: Platform) -> Self {
        self.host = host;
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn BridgeInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Map `spec` to a stdio spec that launches the bridge.
    ///
    /// A spec that is already stdio is returned unchanged.
    pub fn map(&self, spec: &ServerSpec) -> Result<ServerSpec, StitchError> {
        if !spec.is_remote() {
            return Ok(spec.clone());
        }

        let bridge_args = bridge_args(spec)?;
        let runner = self.resolve_runner(spec, bridge_args);
        let timeout_ms = startup_timeout(runner.strategy, spec.timeout_ms);
        debug!(
            server = %spec.id,
            strategy = ?runner.strategy,
            command = %runner.command,
            "bridged remote server"
        );

        Ok(ServerSpec {
            id: spec.id.clone(),
            transport: Transport::Stdio,
            endpoint: None,
            command: Some(normalize_command(&runner.command, self.host)),
            args: runner.args,
            env: spec.env.clone(),
            headers: Default::default(),
            timeout_ms,
            authentication: None,
        })
    }

    /// Pick the invocation, in priority order container, local install, package runner.
    pub fn resolve_runner(&self, spec: &ServerSpec, bridge_args: Vec<String>) -> RunnerSpec {
        if let Some(runtime) = &self.options.container_runtime {
            let mut args = vec!["run".to_string(), "-i".to_string(), "--rm".to_string()];
            for key in spec.env.keys() {
                args.push("-e".to_string());
                args.push(key.clone());
            }
            args.push(format!("{}:{}", self.options.image, self.options.version));
            args.extend(bridge_args);
            return RunnerSpec {
                command: runtime.clone(),
                args,
                strategy: BridgeStrategy::Container,
            };
        }

        if let Some(installer) = self.local_installer() {
            match installer.install(&self.options.package, &self.options.version) {
                Ok(binary) => {
                    return RunnerSpec {
                        command: binary.to_string_lossy().to_string(),
                        args: bridge_args,
                        strategy: BridgeStrategy::LocalInstall,
                    };
                }
                Err(err) => {
                    warn!(
                        package = %self.options.package,
                        version = %self.options.version,
                        error = %err,
                        "local bridge install failed; falling back to package runner"
                    );
                }
            }
        }

        let mut args = vec![
            "-y".to_string(),
            format!("{}@{}", self.options.package, self.options.version),
        ];
        args.extend(bridge_args);
        RunnerSpec {
            command: "npx".to_string(),
            args,
            strategy: BridgeStrategy::PackageRunner,
        }
    }

    fn local_installer(&self) -> Option<&Arc<dyn BridgeInstaller>> {
        let wanted = self.options.prefer_local_install || self.host == Platform::Windows;
        self.installer.as_ref().filter(|_| wanted)
    }
}

/// Arguments handed to the bridge: endpoint, transport, credential, then headers.
///
/// The bearer credential travels as its own value; the `Authorization` header it came
/// from is never forwarded.
pub fn bridge_args(spec: &ServerSpec) -> Result<Vec<String>, StitchError> {
    let endpoint = spec.endpoint.as_deref().ok_or_else(|| {
        StitchError::InvalidSpec(format!("server '{}' has no endpoint to bridge", spec.id))
    })?;
    let (bearer, headers) = spec.split_bearer();

    let mut args = vec![
        endpoint.to_string(),
        "--transport".to_string(),
        spec.transport.as_str().to_string(),
    ];
    if let Some(token) = bearer {
        args.push("--bearer-token".to_string());
        args.push(token);
    }
    for (name, value) in headers {
        args.push("--header".to_string());
        args.push(name);
        args.push(value);
    }
    Ok(args)
}

/// First-run downloads are slow; give fetching strategies at least a minute.
pub fn startup_timeout(strategy: BridgeStrategy, requested: Option<u64>) -> Option<u64> {
    match requested {
        Some(ms) if ms >= FETCH_STARTUP_TIMEOUT_MS => Some(ms),
        _ if strategy.fetches_on_first_run() => Some(FETCH_STARTUP_TIMEOUT_MS),
        other => other,
    }
}

/// Give well-known runner shims their executable suffix so they spawn without a shell.
pub fn normalize_command(command: &str, host: Platform) -> String {
    if host.is_posix() {
        return command.to_string();
    }
    if POSIX_CMD_SHIMS.contains(&command) {
        format!("{}.cmd", command)
    } else if EXE_RUNNERS.contains(&command) {
        format!("{}.exe", command)
    } else {
        command.to_string()
    }
}

/// Default local install root, `<data dir>/stitch/bridge`.
pub fn default_install_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("stitch").join("bridge"))
}
