//! Target registry.
//!
//! The registry is an explicit value built once at start-up and handed to the
//! orchestrator; nothing in the crate reaches for a global instance.

use std::sync::Arc;

use super::{
    ConfigTarget, FileTarget, TargetAdapter, TargetContext, claude_code::ClaudeCodeAdapter,
    claude_desktop::ClaudeDesktopAdapter, codex::CodexAdapter, gemini_cli::GeminiCliAdapter,
    vscode::VsCodeAdapter,
};

/// Registry of available targets, in registration order.
#[derive(Debug, Default, Clone)]
pub struct TargetRegistry {
    targets: Vec<Arc<dyn ConfigTarget>>,
}

impl TargetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
        }
    }

    /// Create a registry with every built-in target bound to `ctx`.
    pub fn with_default_targets(ctx: &TargetContext) -> Self {
        let mut registry = Self::new();
        for adapter in Self::default_adapters() {
            registry.register_adapter(adapter, ctx.clone());
        }
        registry
    }

    pub fn default_adapters() -> Vec<Box<dyn TargetAdapter>> {
        vec![
            Box::new(ClaudeCodeAdapter),
            Box::new(ClaudeDesktopAdapter),
            Box::new(CodexAdapter),
            Box::new(VsCodeAdapter),
            Box::new(GeminiCliAdapter),
        ]
    }

    /// Register a target. A target with the same id replaces the earlier one in place.
    pub fn register(&mut self, target: Arc<dyn ConfigTarget>) {
        match self.targets.iter().position(|t| t.id() == target.id()) {
            Some(index) => self.targets[index] = target,
            None => self.targets.push(target),
        }
    }

    pub fn register_adapter(&mut self, adapter: Box<dyn TargetAdapter>, ctx: TargetContext) {
        self.register(Arc::new(FileTarget::new(adapter, ctx)));
    }

    /// Get all registered targets.
    pub fn all(&self) -> &[Arc<dyn ConfigTarget>] {
        &self.targets
    }

    /// Get a target by ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn ConfigTarget>> {
        self.targets.iter().find(|t| t.id() == id).cloned()
    }

    /// Filter targets by ignoring specific ids (blacklist).
    pub fn filter_excluding_targets(&self, ignore: &[String]) -> TargetRegistry {
        TargetRegistry {
            targets: self
                .targets
                .iter()
                .filter(|t| !ignore.iter().any(|id| id == t.id()))
                .cloned()
                .collect(),
        }
    }

    /// List all target IDs.
    pub fn target_ids(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BUILTIN_TARGET_IDS, Platform};
    use std::path::PathBuf;

    fn ctx() -> TargetContext {
        TargetContext::new(PathBuf::from("/h"), PathBuf::from("/c"), Platform::Linux)
    }

    #[test]
    fn test_default_targets_registered() {
        let registry = TargetRegistry::with_default_targets(&ctx());
        assert_eq!(registry.target_ids(), BUILTIN_TARGET_IDS);
    }

    #[test]
    fn test_get_target_by_id() {
        let registry = TargetRegistry::with_default_targets(&ctx());

        let codex = registry.get("codex").expect("codex registered");
        assert_eq!(codex.descriptor().display_name, "Codex");
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_filter_excluding_targets() {
        let registry = TargetRegistry::with_default_targets(&ctx());
        let remaining = registry.filter_excluding_targets(&["codex".to_string()]);

        assert_eq!(remaining.len(), BUILTIN_TARGET_IDS.len() - 1);
        assert!(remaining.get("codex").is_none());
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = TargetRegistry::new();
        assert!(registry.is_empty());

        registry.register_adapter(Box::new(CodexAdapter), ctx());
        registry.register_adapter(
            Box::new(CodexAdapter),
            ctx().with_override_dir("/override"),
        );

        assert_eq!(registry.len(), 1);
        let codex = registry.get("codex").expect("codex registered");
        assert_eq!(
            codex.detect(None),
            Some(PathBuf::from("/override/config.toml"))
        );
    }
}
