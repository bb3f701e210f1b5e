use crate::concurrency::shutdown_requested;
use crate::environment::{InstallSummary, PackageEnvironment, PhaseOutput};
use crate::lifecycle::Stage;
use crate::CoreError;
use debstage_runtime::CommandRunner;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lines of tool output kept per phase in the report.
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub phase: &'static str,
    pub skipped: bool,
    pub invocations: usize,
    pub output_tail: String,
}

impl PhaseRecord {
    fn ran(stage: Stage, out: &PhaseOutput) -> Self {
        Self {
            phase: stage.phase_name(),
            skipped: false,
            invocations: out.invocations,
            output_tail: tail(&out.output, OUTPUT_TAIL_LINES),
        }
    }

    fn skipped(stage: Stage) -> Self {
        Self {
            phase: stage.phase_name(),
            skipped: true,
            invocations: 0,
            output_tail: String::new(),
        }
    }
}

/// What a pipeline run did, phase by phase.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub cache_root: String,
    pub install_dir: String,
    pub runner: String,
    pub phases: Vec<PhaseRecord>,
    pub install: Option<InstallSummary>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl PipelineReport {
    fn start<R: CommandRunner>(env: &PackageEnvironment<R>) -> Self {
        Self {
            cache_root: env.layout().root().to_string_lossy().into_owned(),
            install_dir: env.layout().install_dir().to_string_lossy().into_owned(),
            runner: env.runner().name().to_owned(),
            phases: Vec::new(),
            install: None,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
        }
    }

    fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
    }

    pub fn total_invocations(&self) -> usize {
        self.phases.iter().map(|p| p.invocations).sum()
    }

    pub fn skipped_phases(&self) -> Vec<&'static str> {
        self.phases
            .iter()
            .filter(|p| p.skipped)
            .map(|p| p.phase)
            .collect()
    }
}

/// The first error of a run, the phase it came from, and what had
/// completed before it.
#[derive(Debug, Error)]
#[error("{} failed: {error}", .stage.phase_name())]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub error: CoreError,
    pub report: PipelineReport,
}

impl PipelineFailure {
    pub fn output(&self) -> &str {
        self.error.output()
    }
}

/// Run setup, keys, repos, update, download and install in order.
///
/// Keys and repos are skipped when the request has none. The first failing
/// phase ends the run; nothing is rolled back. `progress` receives the name
/// of each phase as it starts.
pub fn run_pipeline<R: CommandRunner>(
    env: &mut PackageEnvironment<R>,
    progress: &dyn Fn(&str),
) -> Result<PipelineReport, PipelineFailure> {
    let mut report = PipelineReport::start(env);
    let result = drive(env, &mut report, progress);
    report.finish();

    match result {
        Ok(()) => {
            info!(
                "staged packages into {} ({} invocations)",
                report.install_dir,
                report.total_invocations()
            );
            Ok(report)
        }
        Err((stage, error)) => {
            warn!("{} failed: {error}", stage.phase_name());
            if !error.output().is_empty() {
                debug!("captured output:\n{}", error.output());
            }
            Err(PipelineFailure {
                stage,
                error,
                report,
            })
        }
    }
}

type StepResult<T> = Result<T, (Stage, CoreError)>;

fn drive<R: CommandRunner>(
    env: &mut PackageEnvironment<R>,
    report: &mut PipelineReport,
    progress: &dyn Fn(&str),
) -> StepResult<()> {
    let out = step(env, progress, Stage::Initialized, PackageEnvironment::setup)?;
    report.phases.push(PhaseRecord::ran(Stage::Initialized, &out));

    if env.has_keys() {
        let out = step(env, progress, Stage::Trusted, PackageEnvironment::add_keys)?;
        report.phases.push(PhaseRecord::ran(Stage::Trusted, &out));
    } else {
        debug!("no keys requested, skipping add-keys");
        report.phases.push(PhaseRecord::skipped(Stage::Trusted));
    }

    if env.has_repos() {
        let out = step(env, progress, Stage::Configured, PackageEnvironment::add_repos)?;
        report.phases.push(PhaseRecord::ran(Stage::Configured, &out));
    } else {
        debug!("no repositories requested, skipping add-repos");
        report.phases.push(PhaseRecord::skipped(Stage::Configured));
    }

    let out = step(env, progress, Stage::Updated, PackageEnvironment::update)?;
    report.phases.push(PhaseRecord::ran(Stage::Updated, &out));

    let out = step(env, progress, Stage::Downloaded, PackageEnvironment::download)?;
    report.phases.push(PhaseRecord::ran(Stage::Downloaded, &out));

    let summary = step(env, progress, Stage::Installed, PackageEnvironment::install)?;
    report.phases.push(PhaseRecord::ran(Stage::Installed, &summary.phase));
    report.install = Some(summary);

    Ok(())
}

fn step<R, T, F>(
    env: &mut PackageEnvironment<R>,
    progress: &dyn Fn(&str),
    stage: Stage,
    phase: F,
) -> StepResult<T>
where
    R: CommandRunner,
    F: FnOnce(&mut PackageEnvironment<R>) -> Result<T, CoreError>,
{
    if shutdown_requested() {
        return Err((stage, CoreError::Interrupted));
    }
    progress(stage.phase_name());
    debug!("phase {} starting", stage.phase_name());
    phase(env).map_err(|e| (stage, e))
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
