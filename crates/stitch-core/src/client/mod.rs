//! Target layer: one adapter per supported tool.
//!
//! A [`TargetAdapter`] knows a tool's file format, where the file lives on each platform
//! and how a [`ServerSpec`] maps onto the tool's native entry shape. [`FileTarget`]
//! binds an adapter to the safe mutation engine and exposes the uniform
//! [`ConfigTarget`] contract the orchestrator drives.

pub mod claude_code;
pub mod claude_desktop;
pub mod codex;
pub mod gemini_cli;
pub mod registry;
pub mod target;
pub mod vscode;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::client_config::ConfigFormat;
use crate::error::StitchError;
use crate::mcp::{ServerSpec, Transport};

pub use registry::TargetRegistry;
pub use target::{ConfigTarget, FileTarget, degrade_to_empty};

/// Identifiers of the targets shipped with stitch, in registry order.
pub const BUILTIN_TARGET_IDS: &[&str] = &[
    "claude-code",
    "claude-desktop",
    "codex",
    "vscode",
    "gemini-cli",
];

/// Host operating system family; drives path tables and command normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn is_posix(&self) -> bool {
        !matches!(self, Platform::Windows)
    }
}

/// Directories targets resolve their files against.
#[derive(Debug, Clone)]
pub struct TargetContext {
    pub home_dir: PathBuf,
    pub config_dir: PathBuf,
    pub platform: Platform,
    /// When set, every target resolves `<override_dir>/<file name>` instead of its table.
    pub override_dir: Option<PathBuf>,
}

impl TargetContext {
    pub fn new(home_dir: PathBuf, config_dir: PathBuf, platform: Platform) -> Self {
        Self {
            home_dir,
            config_dir,
            platform,
            override_dir: None,
        }
    }

    /// Create a context from the user's real home and config directories.
    pub fn with_defaults() -> anyhow::Result<Self> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        let config_dir = dirs::config_dir().unwrap_or_else(|| home_dir.join(".config"));
        Ok(Self::new(home_dir, config_dir, Platform::current()))
    }

    pub fn with_override_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.override_dir = Some(dir.into());
        self
    }
}

/// How a target's configuration is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    File,
    ExternalProcess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub id: String,
    pub display_name: String,
    pub write_mode: WriteMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCapabilities {
    pub transports: &'static [Transport],
}

impl TargetCapabilities {
    pub fn supports(&self, transport: Transport) -> bool {
        self.transports.contains(&transport)
    }

    /// A remote spec this target cannot speak, but which a local bridge process could.
    pub fn needs_bridge(&self, spec: &ServerSpec) -> bool {
        spec.is_remote() && !self.supports(spec.transport) && self.supports(Transport::Stdio)
    }
}

/// Per-tool translation between [`ServerSpec`] and the native document.
pub trait TargetAdapter: Send + Sync + fmt::Debug {
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn format(&self) -> ConfigFormat;

    fn capabilities(&self) -> TargetCapabilities;

    fn write_mode(&self) -> WriteMode {
        WriteMode::File
    }

    /// File name joined onto an override directory.
    fn file_name(&self) -> &'static str;

    /// Platform path table, best candidate first.
    fn candidate_paths(&self, ctx: &TargetContext) -> Vec<PathBuf>;

    /// Directory whose presence shows the tool is installed even before it wrote a config.
    fn footprint(&self, _ctx: &TargetContext) -> Option<PathBuf> {
        None
    }

    /// Key path of the server-id → entry map inside the document.
    fn servers_path(&self) -> &'static [&'static str];

    /// Native entry for `spec`. The transport is already known to be supported.
    fn render_entry(&self, spec: &ServerSpec) -> Result<Value, StitchError>;

    /// Read a native entry back. Entries this adapter does not recognize yield `None`.
    fn parse_entry(&self, id: &str, entry: &Value) -> Option<ServerSpec>;

    /// Post-write shape check of a single entry.
    fn check_entry(&self, entry: &Value) -> Result<(), String> {
        check_entry_shape(entry)
    }
}

const STRING_MAP_FIELDS: &[&str] = &["env", "headers", "http_headers"];
const STRING_FIELDS: &[&str] = &["command", "type", "url", "httpUrl", "bearer_token"];
const NUMERIC_FIELDS: &[&str] = &["timeout", "startup_timeout_ms"];

/// Structural check shared by all adapters.
///
/// `command` and the URL fields are strings, `args` is a sequence of strings, the map
/// fields are string-valued objects and timeouts are non-negative integers.
pub fn check_entry_shape(entry: &Value) -> Result<(), String> {
    let obj = entry
        .as_object()
        .ok_or_else(|| "entry must be an object".to_string())?;

    for field in STRING_FIELDS {
        if let Some(value) = obj.get(*field)
            && !value.is_string()
        {
            return Err(format!("'{}' must be a string", field));
        }
    }

    if let Some(args) = obj.get("args") {
        let items = args
            .as_array()
            .ok_or_else(|| "'args' must be an array".to_string())?;
        if items.iter().any(|item| !item.is_string()) {
            return Err("'args' must contain only strings".to_string());
        }
    }

    for field in STRING_MAP_FIELDS {
        if let Some(value) = obj.get(*field) {
            let map = value
                .as_object()
                .ok_or_else(|| format!("'{}' must be an object", field))?;
            if let Some((key, _)) = map.iter().find(|(_, v)| !v.is_string()) {
                return Err(format!("'{}.{}' must be a string", field, key));
            }
        }
    }

    for field in NUMERIC_FIELDS {
        if let Some(value) = obj.get(*field)
            && value.as_u64().is_none()
        {
            return Err(format!("'{}' must be a non-negative integer", field));
        }
    }

    Ok(())
}

pub(crate) fn string_map_value(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Insert `map` under `key` unless it is empty.
pub(crate) fn insert_string_map(
    obj: &mut Map<String, Value>,
    key: &str,
    map: &BTreeMap<String, String>,
) {
    if !map.is_empty() {
        obj.insert(key.to_string(), string_map_value(map));
    }
}

pub(crate) fn read_string_map(entry: &Value, key: &str) -> BTreeMap<String, String> {
    entry
        .get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn read_string_vec(entry: &Value, key: &str) -> Vec<String> {
    entry
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn read_str<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str)
}

/// Rebuild a stdio spec from `{command, args, env}`.
pub(crate) fn parse_stdio_entry(id: &str, entry: &Value) -> Option<ServerSpec> {
    let command = read_str(entry, "command")?;
    let mut spec = ServerSpec::stdio(id, command, read_string_vec(entry, "args"));
    spec.env = read_string_map(entry, "env");
    Some(spec)
}

/// Rebuild a remote spec; a bearer `Authorization` header becomes the credential.
pub(crate) fn parse_remote_entry(
    id: &str,
    transport: Transport,
    url: &str,
    headers: BTreeMap<String, String>,
) -> ServerSpec {
    let mut spec = ServerSpec::remote(id, transport, url);
    spec.headers = headers;
    let (bearer, headers) = spec.split_bearer();
    spec.headers = headers;
    if let Some(token) = bearer {
        spec = spec.with_bearer(token);
    }
    spec
}
