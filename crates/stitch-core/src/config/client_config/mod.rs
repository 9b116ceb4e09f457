//! Target configuration document formats.
//!
//! Every format normalizes to `serde_json::Map<String, Value>` as the intermediate
//! representation, so the mutation engine and the target adapters stay format-agnostic.
//! Keys the adapters do not touch travel through that map untouched.

mod json;
mod toml;

use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::StitchError;

pub use json::JsonSerializer;
pub use toml::TomlSerializer;

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "JSON",
            ConfigFormat::Toml => "TOML",
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format-level failure, wrapped into a path-carrying [`StitchError`] by callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FormatError(pub String);

/// Trait for parsing and rendering target configuration documents.
pub trait ConfigSerializer: Send + Sync + fmt::Debug {
    /// Parse document text into a JSON-compatible map.
    fn parse(&self, content: &str) -> Result<Map<String, Value>, FormatError>;

    /// Render a JSON-compatible map into document text.
    fn render(&self, map: &Map<String, Value>) -> Result<String, FormatError>;

    /// Render `updated` as an edit of `original`, the text `baseline` was parsed from.
    ///
    /// Formats that carry comments or typed values the map cannot hold override this to
    /// touch only the keys that changed.
    fn render_edit(
        &self,
        original: &str,
        baseline: &Map<String, Value>,
        updated: &Map<String, Value>,
    ) -> Result<String, FormatError> {
        let _ = (original, baseline);
        self.render(updated)
    }

    /// Get the format this serializer handles.
    fn format(&self) -> ConfigFormat;

    /// Load a document from disk.
    ///
    /// A missing file or whitespace-only content is an empty document.
    fn load(&self, path: &Path) -> Result<Map<String, Value>, StitchError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StitchError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        self.parse_document(path, &content)
    }

    /// Parse `content` read from `path`, treating blank content as an empty document.
    fn parse_document(&self, path: &Path, content: &str) -> Result<Map<String, Value>, StitchError> {
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        self.parse(content).map_err(|e| StitchError::Parse {
            path: path.to_path_buf(),
            format: self.format().as_str(),
            message: e.0,
        })
    }
}

/// Create a serializer for the given format.
pub fn serializer_for_format(format: ConfigFormat) -> Box<dyn ConfigSerializer> {
    match format {
        ConfigFormat::Json => Box::new(JsonSerializer),
        ConfigFormat::Toml => Box::new(TomlSerializer),
    }
}

/// Look up a nested map. A missing segment yields `Ok(None)`.
pub fn map_at_path<'a>(
    root: &'a Map<String, Value>,
    path: &[&str],
) -> Result<Option<&'a Map<String, Value>>, FormatError> {
    let mut current = root;
    for segment in path {
        match current.get(*segment) {
            Some(Value::Object(next)) => current = next,
            Some(_) => {
                return Err(FormatError(format!(
                    "Expected '{}' to be an object",
                    segment
                )));
            }
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Mutable variant of [`map_at_path`]; with `create`, missing segments are inserted.
pub fn map_at_path_mut<'a>(
    root: &'a mut Map<String, Value>,
    path: &[&str],
    create: bool,
) -> Result<Option<&'a mut Map<String, Value>>, FormatError> {
    let mut current = root;
    for segment in path {
        if create && !current.contains_key(*segment) {
            current.insert(segment.to_string(), Value::Object(Map::new()));
        }
        match current.get_mut(*segment) {
            Some(Value::Object(next)) => current = next,
            Some(_) => {
                return Err(FormatError(format!(
                    "Expected '{}' to be an object",
                    segment
                )));
            }
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Remove `key` from `map` keeping the order of the remaining entries.
pub fn remove_preserving_order(map: &mut Map<String, Value>, key: &str) -> Option<Value> {
    if !map.contains_key(key) {
        return None;
    }
    let mut removed = None;
    let rest: Map<String, Value> = std::mem::take(map)
        .into_iter()
        .filter_map(|(k, v)| {
            if k == key {
                removed = Some(v);
                None
            } else {
                Some((k, v))
            }
        })
        .collect();
    *map = rest;
    removed
}
