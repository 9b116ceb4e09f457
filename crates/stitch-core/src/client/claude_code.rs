//! Claude Code target (`~/.claude.json`).

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
pub struct ClaudeCodeAdapter;

impl TargetAdapter for ClaudeCodeAdapter {
    fn id(&self) -> &'static str {
        "claude-code"
    }

    fn display_name(&self) -> &'static str {
        "Claude Code"
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
        ".claude.json"
    }

    fn candidate_paths(&self, ctx: &TargetContext) -> Vec<PathBuf> {
        vec![ctx.home_dir.join(".claude.json")]
    }

    fn footprint(&self, ctx: &TargetContext) -> Option<PathBuf> {
        Some(ctx.home_dir.join(".claude"))
    }

    fn servers_path(&self) -> &'static [&'static str] {
        &["mcpServers"]
    }

    fn render_entry(&self, spec: &ServerSpec) -> Result<Value, StitchError> {
        match spec.transport {
            Transport::Stdio => Ok(json!({
                "type": "stdio",
                "command": spec.command.clone().unwrap_or_default(),
                "args": spec.args.clone(),
                "env": spec.env.clone(),
            })),
            Transport::Http | Transport::Sse => {
                let mut obj = Map::new();
                obj.insert("type".to_string(), json!(spec.transport.as_str()));
                obj.insert("url".to_string(), json!(spec.endpoint.clone().unwrap_or_default()));
                insert_string_map(&mut obj, "headers", &spec.headers_with_bearer());
                Ok(Value::Object(obj))
            }
        }
    }

    fn parse_entry(&self, id: &str, entry: &Value) -> Option<ServerSpec> {
        let transport = match read_str(entry, "type") {
            Some(kind) => kind.parse().ok()?,
            None if entry.get("url").is_some() => Transport::Http,
            None => Transport::Stdio,
        };
        match transport {
            Transport::Stdio => parse_stdio_entry(id, entry),
            Transport::Http | Transport::Sse => {
                let url = read_str(entry, "url")?;
                Some(parse_remote_entry(id, transport, url, read_string_map(entry, "headers")))
            }
        }
    }
}
