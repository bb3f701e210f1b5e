//! Execution layer for debstage.
//!
//! Every external tool the staging pipeline touches (apt-get, apt-key, curl,
//! dpkg) is described as a typed [`Invocation`] and executed through a
//! [`CommandRunner`]. The system runner merges stderr into stdout, enforces a
//! per-invocation timeout and reports non-zero exits as errors that still
//! carry the captured output. A dry-run runner and a recording mock runner
//! implement the same trait for planning and tests.

pub mod fs;
pub mod invocation;
pub mod mock;
pub mod prereq;
pub mod runner;

pub use fs::copy_file;
pub use invocation::Invocation;
pub use mock::MockRunner;
pub use prereq::{check_host_prereqs, format_missing, MissingPrereq};
pub use runner::{CommandOutput, CommandRunner, DryRunRunner, SystemRunner, DEFAULT_TIMEOUT};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("'{invocation}' exited with status {code}")]
    NonZeroExit {
        invocation: String,
        code: i32,
        output: String,
    },
    #[error("'{invocation}' timed out after {}s", .after.as_secs())]
    TimedOut {
        invocation: String,
        after: Duration,
        output: String,
    },
    #[error("failed to copy {} to {}: {source}", .src.display(), .dst.display())]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Output captured from the child before it failed, if any.
    pub fn output(&self) -> &str {
        match self {
            Self::NonZeroExit { output, .. } | Self::TimedOut { output, .. } => output,
            _ => "",
        }
    }
}
