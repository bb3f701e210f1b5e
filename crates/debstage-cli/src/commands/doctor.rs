use super::{Staging, EXIT_FAILURE, EXIT_SUCCESS};
use debstage_core::{lock_holder, RootLock};
use serde::Serialize;
use std::path::Path;

pub fn run(staging: &Staging, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();

    check_prereqs(&mut checks);
    check_baseline_file(
        &mut checks,
        "host_sources",
        "Host sources list",
        &staging.baseline.sources_list,
    );
    check_baseline_file(
        &mut checks,
        "host_keyring",
        "Host keyring",
        &staging.baseline.trusted_keys,
    );
    check_manifest(&mut checks, &staging.manifest);
    check_root_lock(&mut checks, staging);
    check_disk_space(&mut checks, staging.layout.root());
    checks.push(Check::info(
        "timeout",
        &format!("Per-invocation timeout: {}s", staging.timeout.as_secs()),
    ));

    let all_pass = checks.iter().all(|c| c.status != Status::Fail);
    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(checks: &mut Vec<Check>) {
    let missing = debstage_runtime::check_host_prereqs();
    if missing.is_empty() {
        checks.push(Check::pass(
            "host_prereqs",
            "apt-get, apt-key, curl and dpkg found",
        ));
    } else {
        let names: Vec<&str> = missing.iter().map(|m| m.name).collect();
        checks.push(Check::fail(
            "host_prereqs",
            &format!("Missing host tools: {}", names.join(", ")),
        ));
    }
}

fn check_baseline_file(checks: &mut Vec<Check>, name: &str, label: &str, path: &Path) {
    match std::fs::File::open(path) {
        Ok(_) => checks.push(Check::pass(
            name,
            &format!("{label} readable: {}", path.display()),
        )),
        Err(e) => checks.push(Check::fail(
            name,
            &format!("{label} {} unreadable: {e}", path.display()),
        )),
    }
}

fn check_manifest(checks: &mut Vec<Check>, path: &Path) {
    if !path.exists() {
        checks.push(Check::warn(
            "manifest",
            &format!("Manifest {} not found", path.display()),
        ));
        return;
    }
    match debstage_schema::parse_request_file(path) {
        Ok(request) => {
            let partition = request.partition();
            checks.push(Check::pass(
                "manifest",
                &format!(
                    "Manifest valid: {} keys, {} repos, {} artifacts, {} named packages",
                    request.keys.len() + request.gpg_advanced_options.len(),
                    request.repos.len(),
                    partition.artifacts.len(),
                    partition.named.len()
                ),
            ));
        }
        Err(e) => checks.push(Check::fail("manifest", &format!("Manifest invalid: {e}"))),
    }
}

fn check_root_lock(checks: &mut Vec<Check>, staging: &Staging) {
    let lock_file = staging.layout.lock_file();
    if !lock_file.exists() {
        checks.push(Check::info(
            "root_lock",
            &format!(
                "Cache root {} not initialized (created on first install)",
                staging.layout.root().display()
            ),
        ));
        return;
    }
    match RootLock::try_acquire(&lock_file) {
        Ok(Some(_)) => checks.push(Check::pass("root_lock", "Cache root lock is free")),
        Ok(None) => checks.push(Check::warn(
            "root_lock",
            &format!(
                "Cache root lock is held by {}",
                super::describe_holder(lock_holder(&lock_file))
            ),
        )),
        Err(e) => checks.push(Check::fail(
            "root_lock",
            &format!("Cannot check cache root lock: {e}"),
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("debstage doctor\n");
        for check in checks {
            let icon = match check.status {
                Status::Pass => "✓",
                Status::Fail => "✗",
                Status::Warn => "⚠",
                Status::Info => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    status: Status,
    message: String,
}

impl Check {
    fn new(name: &str, status: Status, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, Status::Pass, message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, Status::Fail, message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, Status::Warn, message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, Status::Info, message)
    }
}

/// Free space on the filesystem holding `root`, or its nearest existing
/// ancestor when the cache root has not been created yet.
fn check_disk_space(checks: &mut Vec<Check>, root: &Path) {
    let Some(existing) = root.ancestors().find(|p| p.exists()) else {
        return;
    };
    let Ok(c_path) = std::ffi::CString::new(existing.to_string_lossy().as_bytes()) else {
        return;
    };

    // SAFETY: zeroed statvfs is a valid initial state for the struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a live, writable struct
    // that is only read after the call reports success.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return;
    }

    #[allow(clippy::unnecessary_cast)]
    let avail_mb = (stat.f_bavail as u64 * stat.f_frsize as u64) / (1024 * 1024);

    if avail_mb < 200 {
        checks.push(Check::fail(
            "disk_space",
            &format!("Low disk space for package cache: {avail_mb} MB available"),
        ));
    } else if avail_mb < 2048 {
        checks.push(Check::warn(
            "disk_space",
            &format!("Disk space: {avail_mb} MB available (large packages may not fit)"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("Disk space: {} GB available", avail_mb / 1024),
        ));
    }
}
