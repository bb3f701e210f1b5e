//! Staging engine for debstage.
//!
//! This crate owns the private apt environment: the directory layout that
//! keeps cache, state, sources and keyring away from the host
//! (`EnvironmentLayout`), the five-phase `PackageEnvironment` (setup, keys,
//! repos, update/download, install), the stage state machine that orders those
//! phases, and the `run_pipeline` driver that sequences them and reports the
//! first failure together with the captured tool output.

pub mod concurrency;
pub mod config;
pub mod environment;
pub mod layout;
pub mod lifecycle;
pub mod pipeline;

pub use concurrency::{install_signal_handler, lock_holder, shutdown_requested, RootLock};
pub use config::StagingConfig;
pub use environment::{ExtractedArtifact, InstallSummary, PackageEnvironment, PhaseOutput};
pub use layout::{EnvironmentLayout, HostBaseline};
pub use lifecycle::{validate_transition, Stage};
pub use pipeline::{run_pipeline, PhaseRecord, PipelineFailure, PipelineReport};

use debstage_runtime::RuntimeError;
use debstage_schema::ManifestError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which trust operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustStep {
    AdvancedOption(String),
    KeyUrl(String),
}

impl fmt::Display for TrustStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdvancedOption(o) => write!(f, "could not pass gpg advanced options `{o}`"),
            Self::KeyUrl(u) => write!(f, "could not add apt key {u}"),
        }
    }
}

/// Which download path failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadKind {
    Artifact { url: String },
    Repository { packages: Vec<String> },
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifact { url } => write!(f, "artifact {url}"),
            Self::Repository { packages } => {
                write!(f, "repository packages [{}]", packages.join(", "))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to seed host baseline: {0}")]
    Baseline(#[source] RuntimeError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("{step}: {source}")]
    Trust {
        step: TrustStep,
        source: RuntimeError,
    },
    #[error("failed to append repositories to {}: {source}", .path.display())]
    RepoWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("metadata refresh failed: {0}")]
    MetadataRefresh(#[source] RuntimeError),
    #[error("download of {kind} failed: {source}")]
    Download {
        kind: DownloadKind,
        source: RuntimeError,
    },
    #[error("failed to extract {}: {source}", .artifact.display())]
    Install {
        artifact: PathBuf,
        source: RuntimeError,
    },
    #[error("failed to scan {}: {source}", .path.display())]
    ArchiveScan {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
    #[error("package request not loaded; run setup first")]
    NotInitialized,
    #[error("interrupted by shutdown request")]
    Interrupted,
    #[error("config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Output captured from the failing tool, empty when no tool ran.
    pub fn output(&self) -> &str {
        match self {
            Self::Trust { source, .. }
            | Self::MetadataRefresh(source)
            | Self::Download { source, .. }
            | Self::Install { source, .. } => source.output(),
            _ => "",
        }
    }
}
