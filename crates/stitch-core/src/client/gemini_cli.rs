//! Gemini CLI target (`~/.gemini/settings.json`).
//!
//! Gemini distinguishes transports by field name: `command` for stdio, `url` for SSE
//! and `httpUrl` for streamable HTTP.

use std::path::PathBuf;

use serde_json::{Map, Value, json};

use super::{
    TargetAdapter, TargetCapabilities, TargetContext, insert_string_map, parse_remote_entry,
    parse_stdio_entry, read_str, read_string_map,
};
use crate::config::client_config::ConfigFormat;
use crate::error::StitchError;
use crate::mcp::{ServerSpec, Transport};

#[derive(Debug, Default)]
pub struct GeminiCliAdapter;

impl TargetAdapter for GeminiCliAdapter {
    fn id(&self) -> &'static str {
        "gemini-cli"
    }

    fn display_name(&self) -> &'static str {
        "Gemini CLI"
    }

    fn format(&self) -> ConfigFormat {
        ConfigFormat::Json
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities {
            transports: &[Transport::Stdio, Transport::Http, Transport::Sse],
        }
    }

    fn file_name(&self) -> &'static str {
        "settings.json"
    }

    fn candidate_paths(&self, ctx: &TargetContext) -> Vec<PathBuf> {
        vec![ctx.home_dir.join(".gemini").join("settings.json")]
    }

    fn footprint(&self, ctx: &TargetContext) -> Option<PathBuf> {
        Some(ctx.home_dir.join(".gemini"))
    }

    fn servers_path(&self) -> &'static [&'static str] {
        &["mcpServers"]
    }

    fn render_entry(&self, spec: &ServerSpec) -> Result<Value, StitchError> {
        let mut obj = Map::new();
        match spec.transport {
            Transport::Stdio => {
                obj.insert("command".to_string(), json!(spec.command.clone().unwrap_or_default()));
                obj.insert("args".to_string(), json!(spec.args.clone()));
                obj.insert("env".to_string(), json!(spec.env.clone()));
            }
            Transport::Sse => {
                obj.insert("url".to_string(), json!(spec.endpoint.clone().unwrap_or_default()));
                insert_string_map(&mut obj, "headers", &spec.headers_with_bearer());
            }
            Transport::Http => {
                obj.insert("httpUrl".to_string(), json!(spec.endpoint.clone().unwrap_or_default()));
                insert_string_map(&mut obj, "headers", &spec.headers_with_bearer());
            }
        }
        if let Some(timeout) = spec.timeout_ms {
            obj.insert("timeout".to_string(), json!(timeout));
        }
        Ok(Value::Object(obj))
    }

    fn parse_entry(&self, id: &str, entry: &Value) -> Option<ServerSpec> {
        let headers = || read_string_map(entry, "headers");
        let mut spec = if let Some(url) = read_str(entry, "httpUrl") {
            parse_remote_entry(id, Transport::Http, url, headers())
        } else if let Some(url) = read_str(entry, "url") {
            parse_remote_entry(id, Transport::Sse, url, headers())
        } else {
            parse_stdio_entry(id, entry)?
        };
        spec.timeout_ms = entry.get("timeout").and_then(Value::as_u64);
        Some(spec)
    }
}
