//! Configuration: stitch's own settings file and the target document layer.
//!
//! - `stitch.toml` ([`StitchConfig`]) tunes the orchestrator, the bridge and the
//!   aggregate store.
//! - [`client_config`] parses and renders target documents (JSON, TOML).
//! - [`mutation`] is the safe mutation engine every target write goes through.

pub mod client_config;
pub mod mutation;
pub mod parser;
pub mod schema;
pub mod store;

pub use client_config::{ConfigFormat, ConfigSerializer, JsonSerializer, TomlSerializer};
pub use mutation::{MutationPhase, ParsePolicy, SafeMutation};
pub use parser::{parse_stitch_toml, parse_stitch_toml_str};
pub use schema::{BridgeSection, OrchestratorSection, StitchConfig, StoreSection, TargetsSection};
pub use store::ConfigStore;
