use serde::Serialize;
use std::fmt;

/// File suffix that marks a package entry as a directly downloadable artifact.
pub const ARTIFACT_SUFFIX: &str = ".deb";

/// A single entry of the `packages` list after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageRef {
    /// Fetched as-is from a URL into the archive cache.
    Artifact { url: String },
    /// Resolved by the package manager through repository metadata.
    Named { name: String },
}

impl PackageRef {
    /// Returns `None` for blank entries.
    pub fn classify(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            None
        } else if entry.ends_with(ARTIFACT_SUFFIX) {
            Some(Self::Artifact {
                url: entry.to_owned(),
            })
        } else {
            Some(Self::Named {
                name: entry.to_owned(),
            })
        }
    }

}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifact { url } => f.write_str(url),
            Self::Named { name } => f.write_str(name),
        }
    }
}

/// Name an artifact URL is cached under in the archive directory.
///
/// This is the last path segment with any query or fragment dropped, as long
/// as that still ends in `.deb`. Otherwise the suffix only appears in the
/// query (`.../get?file=tool_1.0_amd64.deb`) and the raw last segment is used
/// so extraction still picks the file up.
pub fn artifact_file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let clean = last_segment(path);
    if clean.ends_with(ARTIFACT_SUFFIX) {
        clean
    } else {
        last_segment(url)
    }
}

fn last_segment(s: &str) -> &str {
    s.rsplit('/').next().unwrap_or(s)
}

/// `packages` split into the two acquisition classes, each in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackagePartition {
    pub artifacts: Vec<String>,
    pub named: Vec<String>,
}

impl PackagePartition {
    pub fn from_refs(refs: impl IntoIterator<Item = PackageRef>) -> Self {
        let mut partition = Self::default();
        for r in refs {
            match r {
                PackageRef::Artifact { url } => partition.artifacts.push(url),
                PackageRef::Named { name } => partition.named.push(name),
            }
        }
        partition
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.named.is_empty()
    }
}
