use super::{
    describe_failure, failure_payload, json_pretty, lock_root, print_failure_output, Staging,
    EXIT_SUCCESS,
};
use debstage_core::{run_pipeline, PackageEnvironment};
use debstage_runtime::{DryRunRunner, Invocation};
use debstage_schema::{PackagePartition, PackageRequest};

/// Walk the whole pipeline with a runner that records instead of executing.
///
/// Setup still prepares the private tree and copies the host baseline, since
/// that is plain file work; no apt, curl or dpkg process is started.
pub fn run(staging: Staging, json: bool) -> Result<u8, String> {
    let _lock = lock_root(&staging.layout)?;
    let manifest = staging.manifest.clone();

    let runner = DryRunRunner::new();
    let mut env = PackageEnvironment::new(
        &runner,
        staging.manifest,
        staging.layout,
        staging.baseline,
    );

    if let Err(failure) = run_pipeline(&mut env, &|_: &str| {}) {
        if json {
            println!("{}", json_pretty(&failure_payload(&failure))?);
        } else {
            print_failure_output(&failure);
        }
        return Err(describe_failure(&failure));
    }

    let partition = env
        .request()
        .map(PackageRequest::partition)
        .unwrap_or_default();
    let invocations = runner.recorded();

    if json {
        let payload = serde_json::json!({
            "manifest": manifest,
            "cache_root": env.layout().root(),
            "install_dir": env.layout().install_dir(),
            "artifacts": partition.artifacts,
            "named": partition.named,
            "invocations": invocations,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print_plan(&manifest.display().to_string(), &partition, &invocations);
    }
    Ok(EXIT_SUCCESS)
}

fn print_plan(manifest: &str, partition: &PackagePartition, invocations: &[Invocation]) {
    println!("plan for {manifest}");
    println!(
        "  {} artifacts by URL, {} named packages",
        partition.artifacts.len(),
        partition.named.len()
    );
    if invocations.is_empty() {
        println!("  nothing to run");
        return;
    }
    for (i, inv) in invocations.iter().enumerate() {
        println!("  {:>2}. {inv}", i + 1);
    }
}
