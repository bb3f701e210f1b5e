use super::{
    describe_failure, failure_payload, json_pretty, lock_root, phase_label, print_failure_output,
    spin_fail, spin_ok, spinner, Staging, EXIT_SUCCESS,
};
use debstage_core::{run_pipeline, PackageEnvironment, PipelineReport};
use debstage_runtime::SystemRunner;

pub fn run(staging: Staging, json: bool) -> Result<u8, String> {
    let _lock = lock_root(&staging.layout)?;

    let runner = SystemRunner::new().with_timeout(staging.timeout);
    let mut env = PackageEnvironment::new(
        runner,
        staging.manifest,
        staging.layout,
        staging.baseline,
    );

    let pb = if json {
        None
    } else {
        Some(spinner("preparing private apt tree..."))
    };
    let progress = |phase: &str| {
        if let Some(ref pb) = pb {
            pb.set_message(format!("{phase}..."));
        }
    };

    match run_pipeline(&mut env, &progress) {
        Ok(report) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("staged packages into {}", report.install_dir));
            }
            if json {
                let payload = serde_json::json!({
                    "status": "installed",
                    "report": report,
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                print_report(&report);
            }
            Ok(EXIT_SUCCESS)
        }
        Err(failure) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{} failed", failure.stage.phase_name()));
            }
            if json {
                println!("{}", json_pretty(&failure_payload(&failure))?);
            } else {
                print_failure_output(&failure);
            }
            Err(describe_failure(&failure))
        }
    }
}

fn print_report(report: &PipelineReport) {
    let phases: Vec<String> = report.phases.iter().map(phase_label).collect();
    println!("phases: {}", phases.join(" → "));
    if let Some(ref summary) = report.install {
        for artifact in &summary.artifacts {
            println!(
                "  {}  {} bytes  {}",
                artifact.file_name,
                artifact.size,
                &artifact.blake3[..12.min(artifact.blake3.len())]
            );
        }
        println!(
            "{} artifacts extracted, {} files installed",
            summary.artifacts.len(),
            summary.files_installed
        );
    }
    println!("{} tool invocations", report.total_invocations());
}
