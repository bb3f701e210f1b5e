use crate::layout::HostBaseline;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Optional user defaults, read from `~/.config/debstage/config.json`.
/// Command-line flags take precedence over every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default)]
    pub host_sources: Option<PathBuf>,
    #[serde(default)]
    pub host_keyring: Option<PathBuf>,
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl StagingConfig {
    /// A missing default config file is not an error.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn baseline(&self) -> HostBaseline {
        let defaults = HostBaseline::default();
        HostBaseline {
            sources_list: self.host_sources.clone().unwrap_or(defaults.sources_list),
            trusted_keys: self.host_keyring.clone().unwrap_or(defaults.trusted_keys),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/debstage/config.json"))
}
