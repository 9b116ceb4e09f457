//! Stitch Core Library
//!
//! Keeps one MCP server definition in sync across several AI coding tools, each with
//! its own native configuration file. Every write goes through a backup, an atomic
//! replace and a read-back validation; batch operations fan out across targets with
//! per-call timeouts and optional rollback.

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod fs;
pub mod mcp;
pub mod orchestration;
pub mod store;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{ErrorKind, StitchError};

    // Server specs
    pub use crate::mcp::{AuthStrategy, Authentication, ServerSpec, Transport};

    // Targets
    pub use crate::client::{
        ConfigTarget, FileTarget, Platform, TargetAdapter, TargetCapabilities, TargetContext,
        TargetDescriptor, TargetRegistry, WriteMode,
    };

    // Configuration
    pub use crate::config::{ConfigStore, StitchConfig};

    // Bridge
    pub use crate::bridge::{BridgeMapper, BridgeOptions, BridgeStrategy, NpmPrefixInstaller};

    // Orchestration
    pub use crate::orchestration::{
        ConfigureOptions, DispatchMode, Orchestrator, OrchestratorOptions, TargetOutcome,
    };

    // Aggregate store
    pub use crate::store::{StoreDocument, StoredServer, UnifiedStore};
}
