//! End-to-end test against the host's real apt tooling.
//!
//! Ignored by default because it needs:
//! - a Debian or Ubuntu host with `/etc/apt/sources.list` and a keyring
//! - `apt-get`, `apt-key`, `curl` and `dpkg` on PATH
//! - network access to the configured mirrors
//!
//! Run with: `cargo test -p debstage-core --test e2e -- --ignored`

use debstage_core::{run_pipeline, EnvironmentLayout, HostBaseline, PackageEnvironment, Stage};
use debstage_runtime::SystemRunner;
use std::fs;
use std::time::Duration;

fn prereqs_available() -> bool {
    let missing = debstage_runtime::check_host_prereqs();
    if !missing.is_empty() {
        let msg = debstage_runtime::format_missing(&missing);
        assert!(
            std::env::var("CI").is_err(),
            "CI FATAL: e2e prerequisites missing, refusing to skip silently.\n{msg}"
        );
        eprintln!("skipping e2e: {msg}");
        return false;
    }
    let baseline = HostBaseline::default();
    if !baseline.sources_list.exists() || !baseline.trusted_keys.exists() {
        eprintln!("skipping e2e: host apt baseline files not present");
        return false;
    }
    true
}

#[test]
#[ignore = "requires apt-get, apt-key, curl, dpkg, a Debian host baseline and network"]
fn e2e_stage_small_package() {
    if !prereqs_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("apt.yml");
    fs::write(&manifest, "packages:\n  - hello\n").unwrap();

    let layout = EnvironmentLayout::new(dir.path().join("cache"), dir.path().join("app/.apt"));
    let runner = SystemRunner::new().with_timeout(Duration::from_secs(300));
    let mut env = PackageEnvironment::new(runner, &manifest, layout, HostBaseline::default());

    let report = match run_pipeline(&mut env, &|_: &str| {}) {
        Ok(report) => report,
        Err(failure) => panic!("{failure}\n{}", failure.output()),
    };

    assert_eq!(env.stage(), Stage::Installed);
    let summary = report.install.unwrap();
    assert!(summary
        .artifacts
        .iter()
        .any(|a| a.file_name.starts_with("hello_")));
    assert!(dir.path().join("app/.apt/usr/bin/hello").exists());
}
