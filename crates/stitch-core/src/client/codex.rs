//! Codex target.
//!
//! Codex keeps its servers in TOML (`~/.codex/config.toml`) as `[mcp_servers.<id>]`
//! tables. Streamable HTTP is native; SSE endpoints go through the bridge.

use std::path::PathBuf;

use serde_json::{Map, Value, json};

use super::{
    TargetAdapter, TargetCapabilities, TargetContext, insert_string_map, parse_stdio_entry,
    read_str, read_string_map,
};
use crate::config::client_config::ConfigFormat;
use crate::error::StitchError;
use crate::mcp::{ServerSpec, Transport};

#[derive(Debug, Default)]
pub struct CodexAdapter;

impl TargetAdapter for CodexAdapter {
    fn id(&self) -> &'static str {
        "codex"
    }

    fn display_name(&self) -> &'static str {
        "Codex"
    }

    fn format(&self) -> ConfigFormat {
        ConfigFormat::Toml
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities {
            transports: &[Transport::Stdio, Transport::Http],
        }
    }

    fn file_name(&self) -> &'static str {
        "config.toml"
    }

    fn candidate_paths(&self, ctx: &TargetContext) -> Vec<PathBuf> {
        vec![ctx.home_dir.join(".codex").join("config.toml")]
    }

    fn footprint(&self, ctx: &TargetContext) -> Option<PathBuf> {
        Some(ctx.home_dir.join(".codex"))
    }

    fn servers_path(&self) -> &'static [&'static str] {
        &["mcp_servers"]
    }

    fn render_entry(&self, spec: &ServerSpec) -> Result<Value, StitchError> {
        let mut obj = Map::new();
        match spec.transport {
            Transport::Stdio => {
                obj.insert("command".to_string(), json!(spec.command.clone().unwrap_or_default()));
                obj.insert("args".to_string(), json!(spec.args.clone()));
                insert_string_map(&mut obj, "env", &spec.env);
            }
            Transport::Http => {
                let (bearer, headers) = spec.split_bearer();
                obj.insert("url".to_string(), json!(spec.endpoint.clone().unwrap_or_default()));
                if let Some(token) = bearer {
                    obj.insert("bearer_token".to_string(), json!(token));
                }
                insert_string_map(&mut obj, "http_headers", &headers);
            }
            Transport::Sse => {
                return Err(StitchError::precondition(
                    self.id(),
                    "sse endpoints must be bridged to stdio",
                ));
            }
        }
        if let Some(timeout) = spec.timeout_ms {
            obj.insert("startup_timeout_ms".to_string(), json!(timeout));
        }
        Ok(Value::Object(obj))
    }

    fn parse_entry(&self, id: &str, entry: &Value) -> Option<ServerSpec> {
        let mut spec = match read_str(entry, "url") {
            Some(url) => {
                let mut spec = ServerSpec::remote(id, Transport::Http, url);
                spec.headers = read_string_map(entry, "http_headers");
                if let Some(token) = read_str(entry, "bearer_token") {
                    spec = spec.with_bearer(token);
                }
                spec
            }
            None => parse_stdio_entry(id, entry)?,
        };
        spec.timeout_ms = entry.get("startup_timeout_ms").and_then(Value::as_u64);
        Some(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::client_config::{ConfigSerializer, TomlSerializer};

    #[test]
    fn http_entry_splits_bearer_into_dedicated_field() {
        let spec = ServerSpec::remote("api", Transport::Http, "https://api.example.com/mcp")
            .with_header("Authorization", "bearer tok-1")
            .with_header("X-Org", "acme")
            .with_timeout_ms(15000);
        let entry = CodexAdapter.render_entry(&spec).expect("render");

        assert_eq!(
            entry,
            json!({
                "url": "https://api.example.com/mcp",
                "bearer_token": "tok-1",
                "http_headers": {"X-Org": "acme"},
                "startup_timeout_ms": 15000
            })
        );

        let parsed = CodexAdapter.parse_entry("api", &entry).expect("parse");
        assert_eq!(parsed.explicit_bearer(), Some("tok-1"));
        assert!(!parsed.headers.contains_key("Authorization"));
        assert_eq!(parsed.timeout_ms, Some(15000));
    }

    #[test]
    fn stdio_entry_survives_toml_round_trip() {
        let spec = ServerSpec::stdio("fs", "npx", vec!["-y".into(), "server-fs".into()])
            .with_env("ROOT", "/srv");
        let entry = CodexAdapter.render_entry(&spec).expect("render");

        let mut doc = Map::new();
        doc.insert("mcp_servers".to_string(), json!({"fs": entry}));
        let text = TomlSerializer.render(&doc).expect("render toml");
        assert!(text.contains("[mcp_servers.fs]"));

        let reloaded = TomlSerializer.parse(&text).expect("parse toml");
        let parsed = CodexAdapter
            .parse_entry("fs", &reloaded["mcp_servers"]["fs"])
            .expect("parse entry");
        assert_eq!(parsed, spec);
    }

    #[test]
    fn sse_is_rejected() {
        let spec = ServerSpec::remote("s", Transport::Sse, "https://x/sse");
        assert!(CodexAdapter.render_entry(&spec).is_err());
        assert!(CodexAdapter.capabilities().needs_bridge(&spec));
    }
}
