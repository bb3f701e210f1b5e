use crate::package::{PackagePartition, PackageRef};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("failed to parse manifest: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Extra keys, repositories and packages requested for a staging run.
///
/// Every field defaults to an empty list and unknown top-level keys are
/// ignored, so an `apt.yml` that only lists `packages` is valid.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageRequest {
    #[serde(default, deserialize_with = "nullable_list")]
    pub keys: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub gpg_advanced_options: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub repos: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub packages: Vec<String>,
}

/// `packages:` with no entries parses as null in YAML; treat it as empty.
fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl PackageRequest {
    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty() || !self.gpg_advanced_options.is_empty()
    }

    pub fn has_repos(&self) -> bool {
        !self.repos.is_empty()
    }

    /// Classify `packages` in input order, dropping blank entries.
    pub fn package_refs(&self) -> Vec<PackageRef> {
        self.packages
            .iter()
            .map(String::as_str)
            .filter_map(PackageRef::classify)
            .collect()
    }

    pub fn partition(&self) -> PackagePartition {
        PackagePartition::from_refs(self.package_refs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
    Toml,
}

impl ManifestFormat {
    /// `.json` and `.toml` are recognised by extension; everything else,
    /// including extension-less files, is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

pub fn parse_request_str(
    input: &str,
    format: ManifestFormat,
) -> Result<PackageRequest, ManifestError> {
    match format {
        ManifestFormat::Json => Ok(serde_json::from_str(input)?),
        ManifestFormat::Toml => Ok(toml::from_str(input)?),
        ManifestFormat::Yaml => {
            // An empty or comment-only document deserializes to unit, not a map.
            if input.lines().all(|l| {
                let l = l.trim();
                l.is_empty() || l.starts_with('#') || l == "---"
            }) {
                return Ok(PackageRequest::default());
            }
            Ok(serde_yaml::from_str(input)?)
        }
    }
}

pub fn parse_request_file(path: impl AsRef<Path>) -> Result<PackageRequest, ManifestError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    parse_request_str(&content, ManifestFormat::from_path(path))
}
