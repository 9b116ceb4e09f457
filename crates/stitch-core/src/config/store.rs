//! Config store for loading stitch.toml.

use std::path::{Path, PathBuf};

use super::{StitchConfig, parser};

pub const CONFIG_FILE_NAME: &str = "stitch.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// `<config dir>/stitch/stitch.toml`
    pub fn from_default_location() -> anyhow::Result<Self> {
        let global_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("stitch");
        Ok(Self::from_path(global_dir.join(CONFIG_FILE_NAME)))
    }

    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration; a missing file yields the defaults.
    pub fn load(&self) -> anyhow::Result<StitchConfig> {
        if !self.config_path.exists() {
            return Ok(StitchConfig::default());
        }
        parser::parse_stitch_toml(&self.config_path)
    }
}
