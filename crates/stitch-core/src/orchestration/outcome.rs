//! Per-target outcome records returned by batch operations.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{ErrorKind, StitchError};
use crate::mcp::ServerSpec;

/// Result of one target's part in a batch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOutcome {
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// The spec was rewritten into a local bridge invocation for this target.
    pub bridged: bool,
    pub rolled_back: bool,
    /// The target's file was written by this call.
    #[serde(skip)]
    pub changed: bool,
}

pub type DetectionOutcome = TargetOutcome;
pub type ConfigurationOutcome = TargetOutcome;
pub type RemovalOutcome = TargetOutcome;

impl TargetOutcome {
    pub fn succeeded(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: true,
            found: None,
            path: None,
            backup_path: None,
            error: None,
            error_kind: None,
            bridged: false,
            rolled_back: false,
            changed: false,
        }
    }

    pub fn failed(target: impl Into<String>, err: &StitchError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            ..Self::succeeded(target)
        }
    }

    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.path = path;
        self
    }
}

/// Whether any outcome in a batch failed.
pub fn any_failed(outcomes: &[TargetOutcome]) -> bool {
    outcomes.iter().any(|o| !o.success)
}

/// Servers listed by one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetServers {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub servers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A target holding a given server id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLocation {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// The entry read back, when the target's adapter recognizes its shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<ServerSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_outcome_serializes_error_kind() {
        let outcome = TargetOutcome::failed(
            "codex",
            &StitchError::UnknownTarget("codex".to_string()),
        );
        let value = serde_json::to_value(&outcome).expect("serialize");

        assert_eq!(
            value,
            json!({
                "target": "codex",
                "success": false,
                "error": "Unknown target 'codex'",
                "errorKind": "unknown-target",
                "bridged": false,
                "rolledBack": false
            })
        );
    }

    #[test]
    fn any_failed_detects_single_failure() {
        let ok = TargetOutcome::succeeded("a");
        let bad = TargetOutcome::failed("b", &StitchError::InvalidSpec("x".to_string()));
        assert!(!any_failed(&[ok.clone()]));
        assert!(any_failed(&[ok, bad]));
    }
}
