//! Claude Desktop target.
//!
//! Claude Desktop only launches local processes, so remote specs must be bridged before
//! they reach this adapter.

use std::path::PathBuf;

use serde_json::{Value, json};

use super::{Platform, TargetAdapter, TargetCapabilities, TargetContext, parse_stdio_entry};
use crate::config::client_config::ConfigFormat;
use crate::error::StitchError;
use crate::mcp::{ServerSpec, Transport};

const FILE_NAME: &str = "claude_desktop_config.json";

#[derive(Debug, Default)]
pub struct ClaudeDesktopAdapter;

impl ClaudeDesktopAdapter {
    fn config_dir(ctx: &TargetContext) -> PathBuf {
        match ctx.platform {
            Platform::MacOs => ctx
                .home_dir
                .join("Library")
                .join("Application Support")
                .join("Claude"),
            Platform::Windows | Platform::Linux => ctx.config_dir.join("Claude"),
        }
    }
}

impl TargetAdapter for ClaudeDesktopAdapter {
    fn id(&self) -> &'static str {
        "claude-desktop"
    }

    fn display_name(&self) -> &'static str {
        "Claude Desktop"
    }

    fn format(&self) -> ConfigFormat {
        ConfigFormat::Json
    }

    fn capabilities(&self) -> TargetCapabilities {
        TargetCapabilities {
            transports: &[Transport::Stdio],
        }
    }

    fn file_name(&self) -> &'static str {
        FILE_NAME
    }

    fn candidate_paths(&self, ctx: &TargetContext) -> Vec<PathBuf> {
        vec![Self::config_dir(ctx).join(FILE_NAME)]
    }

    fn footprint(&self, ctx: &TargetContext) -> Option<PathBuf> {
        Some(Self::config_dir(ctx))
    }

    fn servers_path(&self) -> &'static [&'static str] {
        &["mcpServers"]
    }

    fn render_entry(&self, spec: &ServerSpec) -> Result<Value, StitchError> {
        if spec.is_remote() {
            return Err(StitchError::precondition(
                self.id(),
                "only local stdio servers are supported",
            ));
        }
        Ok(json!({
            "command": spec.command.clone().unwrap_or_default(),
            "args": spec.args.clone(),
            "env": spec.env.clone(),
        }))
    }

    fn parse_entry(&self, id: &str, entry: &Value) -> Option<ServerSpec> {
        parse_stdio_entry(id, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(platform: Platform) -> TargetContext {
        TargetContext::new(PathBuf::from("/home/u"), PathBuf::from("/cfg"), platform)
    }

    #[test]
    fn path_table_per_platform() {
        let adapter = ClaudeDesktopAdapter;
        assert_eq!(
            adapter.candidate_paths(&ctx(Platform::MacOs)),
            vec![PathBuf::from(
                "/home/u/Library/Application Support/Claude/claude_desktop_config.json"
            )]
        );
        assert_eq!(
            adapter.candidate_paths(&ctx(Platform::Linux)),
            vec![PathBuf::from("/cfg/Claude/claude_desktop_config.json")]
        );
    }

    #[test]
    fn rejects_remote_specs() {
        let spec = ServerSpec::remote("r", Transport::Http, "http://x/y");
        let err = ClaudeDesktopAdapter
            .render_entry(&spec)
            .expect_err("remote should be rejected");
        assert!(matches!(err, StitchError::Precondition { .. }));
    }

    #[test]
    fn stdio_entry_has_no_type_field() {
        let spec = ServerSpec::stdio("s", "uvx", vec!["tool".into()]);
        let entry = ClaudeDesktopAdapter.render_entry(&spec).expect("render");
        assert!(entry.get("type").is_none());
        assert_eq!(ClaudeDesktopAdapter.parse_entry("s", &entry), Some(spec));
    }
}
