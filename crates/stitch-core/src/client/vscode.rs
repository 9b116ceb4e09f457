//! VS Code target (user-level `mcp.json`).

use std::path::PathBuf;

use serde_json::{Map, Value, json};

use super::{
    TargetAdapter, TargetCapabilities, TargetContext, insert_string_map, parse_remote_entry,
    parse_stdio_entry, read_str, read_string_map,
};
use crate::config::client_config::ConfigFormat;
use crate::error::StitchError;
use crate::mcp::{ServerSpec, Transport};

const EDITIONS: &[&str] = &["Code", "Code - Insiders"];

#[derive(Debug, Default)]
pub struct VsCodeAdapter;

impl TargetAdapter for VsCodeAdapter {
    fn id(&self) -> &'static str {
        "vscode"
    }

    fn display_name(&self) -> &'static str {
        "VS Code"
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
        "mcp.json"
    }

    fn candidate_paths(&self, ctx: &TargetContext) -> Vec<PathBuf> {
        EDITIONS
            .iter()
            .map(|edition| ctx.config_dir.join(edition).join("User").join("mcp.json"))
            .collect()
    }

    fn footprint(&self, ctx: &TargetContext) -> Option<PathBuf> {
        Some(ctx.config_dir.join("Code"))
    }

    fn servers_path(&self) -> &'static [&'static str] {
        &["servers"]
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
        let transport: Transport = read_str(entry, "type").unwrap_or("stdio").parse().ok()?;
        match transport {
            Transport::Stdio => parse_stdio_entry(id, entry),
            Transport::Http | Transport::Sse => {
                let url = read_str(entry, "url")?;
                Some(parse_remote_entry(id, transport, url, read_string_map(entry, "headers")))
            }
        }
    }
}
