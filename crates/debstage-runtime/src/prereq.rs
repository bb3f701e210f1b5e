use std::fmt;

/// A host tool the pipeline needs, with an install hint.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

static REQUIRED_TOOLS: &[MissingPrereq] = &[
    MissingPrereq {
        name: "apt-get",
        purpose: "refreshing package metadata and downloading named packages",
        install_hint: "part of apt (Debian/Ubuntu hosts only)",
    },
    MissingPrereq {
        name: "apt-key",
        purpose: "importing signing keys into the private keyring",
        install_hint: "part of apt up to Debian 12 / Ubuntu 22.04",
    },
    MissingPrereq {
        name: "curl",
        purpose: "downloading .deb artifacts by URL",
        install_hint: "apt install curl",
    },
    MissingPrereq {
        name: "dpkg",
        purpose: "extracting .deb payloads into the install root",
        install_hint: "part of dpkg (Debian/Ubuntu hosts only)",
    },
];

fn command_exists(name: &str) -> bool {
    duct::cmd!("which", name)
        .stdout_null()
        .stderr_null()
        .unchecked()
        .run()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check every tool the pipeline invokes. Empty means all are present.
pub fn check_host_prereqs() -> Vec<&'static MissingPrereq> {
    REQUIRED_TOOLS
        .iter()
        .filter(|t| !command_exists(t.name))
        .collect()
}

pub fn format_missing(missing: &[&MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ndebstage drives the host's apt tooling against a private package tree.");
    msg
}
