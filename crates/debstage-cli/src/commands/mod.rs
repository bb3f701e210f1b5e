pub mod completions;
pub mod doctor;
pub mod install;
pub mod man_pages;
pub mod plan;

use clap::Args;
use debstage_core::{
    lock_holder, CoreError, EnvironmentLayout, HostBaseline, PhaseRecord, PipelineFailure,
    RootLock, StagingConfig,
};
use debstage_runtime::DEFAULT_TIMEOUT;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_LOCK_ERROR: u8 = 3;

/// Flags shared by every command that works on a private apt tree.
#[derive(Debug, Clone, Args)]
pub struct StagingArgs {
    /// Package request file (YAML, JSON or TOML, chosen by extension).
    #[arg(long, default_value = "apt.yml")]
    pub manifest: PathBuf,
    /// Root of the private apt tree.
    #[arg(long, default_value = "~/.cache/debstage")]
    pub cache_dir: String,
    /// Directory extracted package contents are written into.
    #[arg(long, default_value = ".apt")]
    pub install_dir: String,
    /// Host sources list the private one is seeded from.
    #[arg(long)]
    pub host_sources: Option<PathBuf>,
    /// Host keyring the private one is seeded from.
    #[arg(long)]
    pub host_keyring: Option<PathBuf>,
    /// Seconds a single tool invocation may run before it is killed.
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Flags merged over config over built-in defaults.
#[derive(Debug, Clone)]
pub struct Staging {
    pub manifest: PathBuf,
    pub layout: EnvironmentLayout,
    pub baseline: HostBaseline,
    pub timeout: Duration,
}

impl StagingArgs {
    pub fn resolve(&self, config: &StagingConfig) -> Staging {
        let mut baseline = config.baseline();
        if let Some(p) = &self.host_sources {
            baseline.sources_list.clone_from(p);
        }
        if let Some(p) = &self.host_keyring {
            baseline.trusted_keys.clone_from(p);
        }
        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .or_else(|| config.timeout())
            .unwrap_or(DEFAULT_TIMEOUT);
        Staging {
            manifest: self.manifest.clone(),
            layout: EnvironmentLayout::new(
                expand_tilde(&self.cache_dir),
                expand_tilde(&self.install_dir),
            ),
            baseline,
            timeout,
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Exclusive hold on a cache root; a second run against the same root fails
/// instead of waiting.
pub fn lock_root(layout: &EnvironmentLayout) -> Result<RootLock, String> {
    let lock_file = layout.lock_file();
    match RootLock::try_acquire(&lock_file) {
        Ok(Some(lock)) => Ok(lock),
        Ok(None) => Err(format!(
            "root lock: {} is in use by {}",
            layout.root().display(),
            describe_holder(lock_holder(&lock_file))
        )),
        Err(e) => Err(format!("root lock: {e}")),
    }
}

pub fn describe_holder(pid: Option<u32>) -> String {
    match pid {
        Some(pid) => format!("debstage (pid {pid})"),
        None => "another debstage run".to_owned(),
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Error message for a failed run. Manifest problems keep their own prefix so
/// they map to the manifest exit code.
pub fn describe_failure(failure: &PipelineFailure) -> String {
    match &failure.error {
        CoreError::Manifest(_) => failure.error.to_string(),
        _ => failure.to_string(),
    }
}

pub fn failure_payload(failure: &PipelineFailure) -> serde_json::Value {
    serde_json::json!({
        "status": "failed",
        "stage": failure.stage.phase_name(),
        "error": failure.error.to_string(),
        "output": failure.output(),
        "report": failure.report,
    })
}

/// Print the captured tool output of a failure, dimmed, on stderr.
pub fn print_failure_output(failure: &PipelineFailure) {
    let output = failure.output().trim_end();
    if !output.is_empty() {
        eprintln!("{}", console::Style::new().dim().apply_to(output));
    }
}

pub fn phase_label(record: &PhaseRecord) -> String {
    use console::Style;
    if record.skipped {
        Style::new()
            .dim()
            .apply_to(format!("{} (skipped)", record.phase))
            .to_string()
    } else {
        Style::new().green().apply_to(record.phase).to_string()
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish_plain(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish_plain(pb, format!("✗ {msg}"));
}

fn finish_plain(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}
