//! Package request schema for debstage.
//!
//! This crate defines the declarative side of a staging run: the
//! `PackageRequest` loaded from an `apt.yml`-style manifest (YAML, JSON or
//! TOML), and the classification of requested packages into direct `.deb`
//! artifacts and names resolved through repository metadata.

pub mod manifest;
pub mod package;

pub use manifest::{
    parse_request_file, parse_request_str, ManifestError, ManifestFormat, PackageRequest,
};
pub use package::{artifact_file_name, PackagePartition, PackageRef, ARTIFACT_SUFFIX};
