//! MCP server descriptions shared by targets, the bridge and the orchestrator.

pub mod spec;

pub use spec::{AuthStrategy, Authentication, ServerSpec, Transport};
