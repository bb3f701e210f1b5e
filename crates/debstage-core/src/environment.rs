use crate::layout::{EnvironmentLayout, HostBaseline};
use crate::lifecycle::{validate_transition, Stage};
use crate::{CoreError, DownloadKind, TrustStep};
use debstage_runtime::{copy_file, CommandRunner, Invocation};
use debstage_schema::{
    artifact_file_name, parse_request_file, PackageRequest, ARTIFACT_SUFFIX,
};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a phase ran and the output of its last invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseOutput {
    pub invocations: usize,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedArtifact {
    pub file_name: String,
    pub size: u64,
    pub blake3: String,
}

/// Result of the install phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallSummary {
    #[serde(flatten)]
    pub phase: PhaseOutput,
    pub artifacts: Vec<ExtractedArtifact>,
    /// Regular files and symlinks present under the install root afterwards.
    pub files_installed: usize,
}

/// A private apt environment and the staging phases that run against it.
///
/// Phases must run in pipeline order; each one checks the stage transition
/// first and leaves the environment in [`Stage::Failed`] when it errors.
pub struct PackageEnvironment<R: CommandRunner> {
    layout: EnvironmentLayout,
    baseline: HostBaseline,
    manifest: PathBuf,
    runner: R,
    request: Option<PackageRequest>,
    stage: Stage,
}

impl<R: CommandRunner> PackageEnvironment<R> {
    pub fn new(
        runner: R,
        manifest: impl Into<PathBuf>,
        layout: EnvironmentLayout,
        baseline: HostBaseline,
    ) -> Self {
        Self {
            layout,
            baseline,
            manifest: manifest.into(),
            runner,
            request: None,
            stage: Stage::Uninitialized,
        }
    }

    pub fn layout(&self) -> &EnvironmentLayout {
        &self.layout
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// The loaded request; `None` until setup succeeds.
    pub fn request(&self) -> Option<&PackageRequest> {
        self.request.as_ref()
    }

    pub fn has_keys(&self) -> bool {
        self.request.as_ref().is_some_and(PackageRequest::has_keys)
    }

    pub fn has_repos(&self) -> bool {
        self.request.as_ref().is_some_and(PackageRequest::has_repos)
    }

    fn loaded(&self) -> Result<&PackageRequest, CoreError> {
        self.request.as_ref().ok_or(CoreError::NotInitialized)
    }

    fn finish<T>(&mut self, to: Stage, result: Result<T, CoreError>) -> Result<T, CoreError> {
        self.stage = if result.is_ok() { to } else { Stage::Failed };
        result
    }

    /// Create the private directories, seed sources and keyring from the
    /// host baseline, then load the package request.
    pub fn setup(&mut self) -> Result<PhaseOutput, CoreError> {
        validate_transition(self.stage, Stage::Initialized)?;
        info!("setting up private apt tree at {}", self.layout.root().display());
        let result = self.seed_and_load();
        self.finish(Stage::Initialized, result)
    }

    fn seed_and_load(&mut self) -> Result<PhaseOutput, CoreError> {
        for dir in self.layout.required_dirs() {
            std::fs::create_dir_all(&dir).map_err(|source| CoreError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        copy_file(&self.baseline.sources_list, &self.layout.sources_list())
            .map_err(CoreError::Baseline)?;
        copy_file(&self.baseline.trusted_keys, &self.layout.trusted_keys())
            .map_err(CoreError::Baseline)?;

        let request = parse_request_file(&self.manifest)?;
        debug!(
            "loaded {}: {} keys, {} advanced options, {} repos, {} packages",
            self.manifest.display(),
            request.keys.len(),
            request.gpg_advanced_options.len(),
            request.repos.len(),
            request.packages.len()
        );
        self.request = Some(request);
        Ok(PhaseOutput::default())
    }

    /// Apply advanced keyring directives, then fetch key URLs, into the
    /// private keyring. Directives go first because they may configure how
    /// the fetches are verified.
    pub fn add_keys(&mut self) -> Result<PhaseOutput, CoreError> {
        validate_transition(self.stage, Stage::Trusted)?;
        let result = self.import_keys();
        self.finish(Stage::Trusted, result)
    }

    fn import_keys(&self) -> Result<PhaseOutput, CoreError> {
        let request = self.loaded()?;
        let keyring = self.layout.trusted_keys();
        let mut phase = PhaseOutput::default();

        for directive in &request.gpg_advanced_options {
            info!("applying gpg advanced options `{directive}`");
            let inv = Invocation::new("apt-key")
                .arg("--keyring")
                .path_arg(&keyring)
                .arg("adv")
                .args(directive.split_whitespace());
            phase.invocations += 1;
            let out = self.runner.output(&inv).map_err(|source| CoreError::Trust {
                step: TrustStep::AdvancedOption(directive.clone()),
                source,
            })?;
            phase.output = out.combined;
        }

        for key_url in &request.keys {
            info!("adding apt key {key_url}");
            let inv = Invocation::new("apt-key")
                .arg("--keyring")
                .path_arg(&keyring)
                .args(["adv", "--fetch-keys"])
                .arg(key_url.as_str());
            phase.invocations += 1;
            let out = self.runner.output(&inv).map_err(|source| CoreError::Trust {
                step: TrustStep::KeyUrl(key_url.clone()),
                source,
            })?;
            phase.output = out.combined;
        }

        Ok(phase)
    }

    /// Append each repository line, newline-prefixed, to the private
    /// sources list. Existing content is never rewritten.
    pub fn add_repos(&mut self) -> Result<PhaseOutput, CoreError> {
        validate_transition(self.stage, Stage::Configured)?;
        let result = self.append_repos();
        self.finish(Stage::Configured, result)
    }

    fn append_repos(&self) -> Result<PhaseOutput, CoreError> {
        let request = self.loaded()?;
        let path = self.layout.sources_list();
        let wrap = |source| CoreError::RepoWrite {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new().append(true).open(&path).map_err(wrap)?;
        for repo in &request.repos {
            info!("adding repository `{repo}`");
            file.write_all(format!("\n{repo}").as_bytes())
                .map_err(wrap)?;
        }
        file.flush().map_err(wrap)?;
        Ok(PhaseOutput::default())
    }

    /// Refresh package metadata against the private sources and keyring.
    pub fn update(&mut self) -> Result<PhaseOutput, CoreError> {
        validate_transition(self.stage, Stage::Updated)?;
        info!("refreshing package metadata");
        let inv = Invocation::new("apt-get")
            .args(self.layout.apt_options())
            .arg("update");
        let result = self
            .runner
            .output(&inv)
            .map(|out| PhaseOutput {
                invocations: 1,
                output: out.combined,
            })
            .map_err(CoreError::MetadataRefresh);
        self.finish(Stage::Updated, result)
    }

    /// Fetch `.deb` URLs one by one into the archive cache, then download
    /// every named package in a single apt-get call so the resolver pulls
    /// their dependencies together.
    pub fn download(&mut self) -> Result<PhaseOutput, CoreError> {
        validate_transition(self.stage, Stage::Downloaded)?;
        let result = self.fetch_packages();
        self.finish(Stage::Downloaded, result)
    }

    fn fetch_packages(&self) -> Result<PhaseOutput, CoreError> {
        let partition = self.loaded()?.partition();
        let archives = self.layout.archives_dir();
        let mut phase = PhaseOutput::default();

        for url in &partition.artifacts {
            let dest = archives.join(artifact_file_name(url));
            info!("fetching {url}");
            let inv = Invocation::new("curl")
                .args(["-s", "-f", "-L", "-z"])
                .path_arg(&dest)
                .arg("-o")
                .path_arg(&dest)
                .arg(url.as_str());
            phase.invocations += 1;
            let out = self.runner.output(&inv).map_err(|source| CoreError::Download {
                kind: DownloadKind::Artifact { url: url.clone() },
                source,
            })?;
            phase.output = out.combined;
        }

        if !partition.named.is_empty() {
            info!("downloading {}", partition.named.join(", "));
            let inv = Invocation::new("apt-get")
                .args(self.layout.apt_options())
                .args(["-f", "-y", "--force-yes", "-d", "install", "--reinstall"])
                .args(partition.named.iter().cloned());
            phase.invocations += 1;
            let out = self.runner.output(&inv).map_err(|source| CoreError::Download {
                kind: DownloadKind::Repository {
                    packages: partition.named.clone(),
                },
                source,
            })?;
            phase.output = out.combined;
        }

        Ok(phase)
    }

    /// Extract every cached `.deb` into the install root. No package
    /// database is touched; dependencies must already be in the cache.
    pub fn install(&mut self) -> Result<InstallSummary, CoreError> {
        validate_transition(self.stage, Stage::Installed)?;
        let result = self.extract_archives();
        self.finish(Stage::Installed, result)
    }

    fn extract_archives(&self) -> Result<InstallSummary, CoreError> {
        let archives = self.layout.archives_dir();
        let install_dir = self.layout.install_dir();
        let files = list_artifacts(&archives)?;
        let mut summary = InstallSummary::default();

        for file in &files {
            info!("extracting {}", file.display());
            let inv = Invocation::new("dpkg")
                .arg("-x")
                .path_arg(file)
                .path_arg(install_dir);
            summary.phase.invocations += 1;
            let out = self.runner.output(&inv).map_err(|source| CoreError::Install {
                artifact: file.clone(),
                source,
            })?;
            summary.phase.output = out.combined;
            summary.artifacts.push(describe_artifact(file)?);
        }

        summary.files_installed = count_files(install_dir).map_err(|source| {
            CoreError::ArchiveScan {
                path: install_dir.to_path_buf(),
                source,
            }
        })?;
        debug!(
            "{} artifacts extracted, {} files under {}",
            summary.artifacts.len(),
            summary.files_installed,
            install_dir.display()
        );
        Ok(summary)
    }
}

/// `*.deb` regular files directly under `dir`, sorted by name.
fn list_artifacts(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let scan_err = |source| CoreError::ArchiveScan {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let path = entry.path();
        let is_deb = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(ARTIFACT_SUFFIX));
        if is_deb && entry.file_type().map_err(scan_err)?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Size and digest of an archive, hashed in chunks so large packages are
/// never held in memory.
fn describe_artifact(path: &Path) -> Result<ExtractedArtifact, CoreError> {
    let scan_err = |source| CoreError::ArchiveScan {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(scan_err)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(scan_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(ExtractedArtifact {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size,
        blake3: hasher.finalize().to_hex().to_string(),
    })
}

fn count_files(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let ft = entry.file_type()?;
        if ft.is_dir() {
            count += count_files(&entry.path())?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use debstage_runtime::MockRunner;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        manifest: PathBuf,
        baseline: HostBaseline,
    }

    fn fixture(manifest: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let host = root.join("host");
        fs::create_dir_all(&host).unwrap();
        fs::write(host.join("sources.list"), "deb http://host.example/ubuntu jammy main").unwrap();
        fs::write(host.join("trusted.gpg"), b"host-keyring").unwrap();
        let manifest_path = root.join("apt.yml");
        fs::write(&manifest_path, manifest).unwrap();
        Fixture {
            baseline: HostBaseline {
                sources_list: host.join("sources.list"),
                trusted_keys: host.join("trusted.gpg"),
            },
            manifest: manifest_path,
            root,
            _dir: dir,
        }
    }

    fn env_for(fx: &Fixture, runner: MockRunner) -> PackageEnvironment<MockRunner> {
        let layout = EnvironmentLayout::new(fx.root.join("cache"), fx.root.join("install"));
        PackageEnvironment::new(runner, &fx.manifest, layout, fx.baseline.clone())
    }

    #[test]
    fn setup_creates_tree_and_seeds_baseline() {
        let fx = fixture("packages: [git]\n");
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();

        let layout = env.layout().clone();
        assert!(layout.cache_dir().is_dir());
        assert!(layout.archives_dir().join("partial").is_dir());
        assert!(layout.state_dir().join("lists/partial").is_dir());
        assert!(layout.install_dir().is_dir());
        assert_eq!(
            fs::read_to_string(layout.sources_list()).unwrap(),
            "deb http://host.example/ubuntu jammy main"
        );
        assert_eq!(fs::read(layout.trusted_keys()).unwrap(), b"host-keyring");
        assert_eq!(env.stage(), Stage::Initialized);
        assert_eq!(env.request().unwrap().packages, vec!["git"]);
        assert_eq!(env.runner().call_count(), 0);
    }

    #[test]
    fn setup_is_idempotent_across_runs() {
        let fx = fixture("packages: [git]\n");
        env_for(&fx, MockRunner::new()).setup().unwrap();
        let mut second = env_for(&fx, MockRunner::new());
        second.setup().unwrap();
        assert_eq!(
            fs::read_to_string(second.layout().sources_list()).unwrap(),
            "deb http://host.example/ubuntu jammy main"
        );
    }

    #[test]
    fn setup_fails_on_missing_baseline() {
        let fx = fixture("packages: [git]\n");
        fs::remove_file(&fx.baseline.trusted_keys).unwrap();
        let mut env = env_for(&fx, MockRunner::new());
        let err = env.setup().unwrap_err();
        assert!(matches!(err, CoreError::Baseline(_)));
        assert_eq!(env.stage(), Stage::Failed);
        assert!(env.request().is_none());
    }

    #[test]
    fn setup_fails_on_malformed_manifest() {
        let fx = fixture("packages: [git\n");
        let mut env = env_for(&fx, MockRunner::new());
        let err = env.setup().unwrap_err();
        assert!(matches!(err, CoreError::Manifest(_)));
        assert_eq!(env.stage(), Stage::Failed);
    }

    #[test]
    fn failed_environment_refuses_further_phases() {
        let fx = fixture("packages: [git\n");
        let mut env = env_for(&fx, MockRunner::new());
        assert!(env.setup().is_err());
        assert!(matches!(
            env.update(),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(env.runner().call_count(), 0);
    }

    #[test]
    fn phases_out_of_order_are_rejected() {
        let fx = fixture("packages: [git]\n");
        let mut env = env_for(&fx, MockRunner::new());
        assert!(matches!(
            env.download(),
            Err(CoreError::InvalidTransition { .. })
        ));
        // A rejected transition does not poison the environment.
        assert_eq!(env.stage(), Stage::Uninitialized);
        env.setup().unwrap();
        assert!(env.install().is_err());
        assert_eq!(env.stage(), Stage::Initialized);
    }

    #[test]
    fn has_keys_and_repos_reflect_request() {
        let fx = fixture("packages: [git]\n");
        let mut env = env_for(&fx, MockRunner::new());
        assert!(!env.has_keys());
        env.setup().unwrap();
        assert!(!env.has_keys());
        assert!(!env.has_repos());

        let fx = fixture("keys: [https://k/key.asc]\nrepos: ['deb http://a']\n");
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        assert!(env.has_keys());
        assert!(env.has_repos());
    }

    #[test]
    fn add_keys_runs_advanced_options_before_keys() {
        let fx = fixture(
            "gpg_advanced_options:\n  - --keyserver hkp://ks.example --recv-keys AAAA\n  - --recv-keys BBBB\nkeys:\n  - https://k/one.asc\n  - https://k/two.asc\n",
        );
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        let out = env.add_keys().unwrap();
        assert_eq!(out.invocations, 4);

        let keyring = env.layout().trusted_keys().display().to_string();
        let calls = env.runner().invocations();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c.program == "apt-key"));
        assert_eq!(
            calls[0].args,
            vec![
                "--keyring",
                keyring.as_str(),
                "adv",
                "--keyserver",
                "hkp://ks.example",
                "--recv-keys",
                "AAAA"
            ]
        );
        assert_eq!(calls[1].args[3..], ["--recv-keys", "BBBB"]);
        assert_eq!(
            calls[2].args,
            vec!["--keyring", keyring.as_str(), "adv", "--fetch-keys", "https://k/one.asc"]
        );
        assert_eq!(calls[3].args.last().unwrap(), "https://k/two.asc");
        assert_eq!(env.stage(), Stage::Trusted);
    }

    #[test]
    fn add_keys_stops_at_first_failure() {
        let fx = fixture(
            "gpg_advanced_options: ['--recv-keys A', '--recv-keys B']\nkeys: ['https://k/1.asc', 'https://k/2.asc']\n",
        );
        for fail_at in 1..=4 {
            let mut env = env_for(&fx, MockRunner::new().fail_on(fail_at));
            env.setup().unwrap();
            let err = env.add_keys().unwrap_err();
            assert_eq!(env.runner().call_count(), fail_at);
            assert_eq!(env.stage(), Stage::Failed);
            assert!(err.output().contains(&format!("call {fail_at}")));
            match (fail_at, &err) {
                (1, CoreError::Trust { step, .. }) => {
                    assert_eq!(*step, TrustStep::AdvancedOption("--recv-keys A".to_owned()));
                }
                (4, CoreError::Trust { step, .. }) => {
                    assert_eq!(*step, TrustStep::KeyUrl("https://k/2.asc".to_owned()));
                }
                (_, CoreError::Trust { .. }) => {}
                (_, other) => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn add_repos_appends_after_baseline() {
        let fx = fixture("repos:\n  - deb http://a\n  - deb http://b\n");
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        env.add_repos().unwrap();

        let content = fs::read_to_string(env.layout().sources_list()).unwrap();
        assert!(content.starts_with("deb http://host.example/ubuntu jammy main"));
        assert!(content.ends_with("\ndeb http://a\ndeb http://b"));
        assert_eq!(env.runner().call_count(), 0);
        assert_eq!(env.stage(), Stage::Configured);
    }

    #[test]
    fn add_repos_fails_when_sources_missing() {
        let fx = fixture("repos: ['deb http://a']\n");
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        fs::remove_file(env.layout().sources_list()).unwrap();
        let err = env.add_repos().unwrap_err();
        assert!(matches!(err, CoreError::RepoWrite { .. }));
        // Append mode never creates the file.
        assert!(!env.layout().sources_list().exists());
    }

    #[test]
    fn update_uses_private_options() {
        let fx = fixture("packages: [git]\n");
        let mut env = env_for(&fx, MockRunner::new().with_output("Reading package lists..."));
        env.setup().unwrap();
        let out = env.update().unwrap();
        assert_eq!(out.output, "Reading package lists...");

        let calls = env.runner().invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "apt-get");
        let mut expected = env.layout().apt_options();
        expected.push("update".to_owned());
        assert_eq!(calls[0].args, expected);
        assert_eq!(calls[0].working_dir, PathBuf::from("/"));
    }

    #[test]
    fn update_failure_is_metadata_refresh() {
        let fx = fixture("packages: [git]\n");
        let mut env = env_for(&fx, MockRunner::new().fail_on(1));
        env.setup().unwrap();
        let err = env.update().unwrap_err();
        assert!(matches!(err, CoreError::MetadataRefresh(_)));
        assert!(!err.output().is_empty());
    }

    #[test]
    fn download_partitions_artifacts_and_names() {
        let fx = fixture(
            "packages:\n  - https://x.example/foo.deb\n  - bar\n  - https://x.example/pool/baz.deb\n  - ''\n",
        );
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        env.update().unwrap();
        let out = env.download().unwrap();
        assert_eq!(out.invocations, 3);

        let calls = env.runner().invocations();
        let archives = env.layout().archives_dir();
        let foo = archives.join("foo.deb").display().to_string();
        assert_eq!(calls[1].program, "curl");
        assert_eq!(
            calls[1].args,
            vec!["-s", "-f", "-L", "-z", foo.as_str(), "-o", foo.as_str(), "https://x.example/foo.deb"]
        );
        let baz = archives.join("baz.deb").display().to_string();
        assert_eq!(calls[2].program, "curl");
        assert_eq!(calls[2].value_of("-o"), Some(baz.as_str()));

        assert_eq!(calls[3].program, "apt-get");
        let tail: Vec<&str> = calls[3].args[10..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            ["-f", "-y", "--force-yes", "-d", "install", "--reinstall", "bar"]
        );
    }

    #[test]
    fn download_batches_named_packages_once() {
        let fx = fixture("packages: [git, curl, libpq5]\n");
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        env.update().unwrap();
        env.download().unwrap();
        let programs = env.runner().programs();
        assert_eq!(programs, vec!["apt-get", "apt-get"]);
        let last = env.runner().invocations().pop().unwrap();
        assert!(last.args.ends_with(&[
            "--reinstall".to_owned(),
            "git".to_owned(),
            "curl".to_owned(),
            "libpq5".to_owned()
        ]));
    }

    #[test]
    fn download_skips_apt_without_named_packages() {
        let fx = fixture("packages: ['https://x/only.deb']\n");
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        env.update().unwrap();
        env.download().unwrap();
        assert_eq!(env.runner().programs(), vec!["apt-get", "curl"]);
    }

    #[test]
    fn download_stops_on_artifact_failure() {
        let fx = fixture("packages: ['https://x/a.deb', 'https://x/b.deb', git]\n");
        // call 1 is update, call 2 the first curl
        let mut env = env_for(&fx, MockRunner::new().fail_on(2));
        env.setup().unwrap();
        env.update().unwrap();
        let err = env.download().unwrap_err();
        assert_eq!(env.runner().call_count(), 2);
        match err {
            CoreError::Download {
                kind: DownloadKind::Artifact { url },
                ..
            } => assert_eq!(url, "https://x/a.deb"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn download_reports_repository_failure() {
        let fx = fixture("packages: [git, vim]\n");
        let mut env = env_for(&fx, MockRunner::new().fail_on(2));
        env.setup().unwrap();
        env.update().unwrap();
        match env.download().unwrap_err() {
            CoreError::Download {
                kind: DownloadKind::Repository { packages },
                ..
            } => assert_eq!(packages, vec!["git", "vim"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn install_extracts_each_cached_deb() {
        let fx = fixture("packages: []\n");
        let mut env = env_for(&fx, MockRunner::new());
        env.setup().unwrap();
        env.update().unwrap();
        env.download().unwrap();

        let archives = env.layout().archives_dir();
        fs::write(archives.join("b_1.0_amd64.deb"), b"bbb").unwrap();
        fs::write(archives.join("a_1.0_amd64.deb"), b"").unwrap();
        fs::write(archives.join("lock"), b"").unwrap();
        fs::create_dir_all(archives.join("dir.deb")).unwrap();

        let summary = env.install().unwrap();
        assert_eq!(summary.phase.invocations, 2);
        assert_eq!(summary.artifacts.len(), 2);
        assert_eq!(summary.artifacts[0].file_name, "a_1.0_amd64.deb");
        assert_eq!(summary.artifacts[1].size, 3);
        assert_eq!(summary.artifacts[1].blake3.len(), 64);

        let install_dir = env.layout().install_dir().display().to_string();
        let calls: Vec<_> = env
            .runner()
            .invocations()
            .into_iter()
            .filter(|c| c.program == "dpkg")
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].args,
            vec![
                "-x".to_owned(),
                archives.join("a_1.0_amd64.deb").display().to_string(),
                install_dir
            ]
        );
        assert_eq!(env.stage(), Stage::Installed);
    }

    #[test]
    fn install_stops_on_first_extraction_failure() {
        let fx = fixture("packages: []\n");
        // update is call 1, the first dpkg call 2
        let mut env = env_for(&fx, MockRunner::new().fail_on(2));
        env.setup().unwrap();
        env.update().unwrap();
        env.download().unwrap();
        let archives = env.layout().archives_dir();
        fs::write(archives.join("a.deb"), b"").unwrap();
        fs::write(archives.join("b.deb"), b"").unwrap();

        match env.install().unwrap_err() {
            CoreError::Install { artifact, .. } => assert_eq!(artifact, archives.join("a.deb")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(env.runner().call_count(), 2);
        assert_eq!(env.stage(), Stage::Failed);
    }

    #[test]
    fn install_counts_files_under_root() {
        let fx = fixture("packages: []\n");
        let runner = MockRunner::new().with_hook(|inv| {
            if inv.program == "dpkg" {
                let root = PathBuf::from(&inv.args[2]);
                fs::create_dir_all(root.join("usr/lib"))?;
                fs::write(root.join("usr/lib/libfoo.so.1"), b"elf")?;
                fs::create_dir_all(root.join("usr/bin"))?;
                fs::write(root.join("usr/bin/foo"), b"#!")?;
            }
            Ok(())
        });
        let mut env = env_for(&fx, runner);
        env.setup().unwrap();
        env.update().unwrap();
        env.download().unwrap();
        fs::write(env.layout().archives_dir().join("foo.deb"), b"x").unwrap();
        let summary = env.install().unwrap();
        assert_eq!(summary.files_installed, 2);
    }

    #[test]
    fn describe_artifact_hashes_archives_larger_than_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big_1.0_amd64.deb");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let artifact = describe_artifact(&path).unwrap();
        assert_eq!(artifact.file_name, "big_1.0_amd64.deb");
        assert_eq!(artifact.size, 200_000);
        assert_eq!(artifact.blake3, blake3::hash(&data).to_hex().to_string());
    }

    #[test]
    fn describe_artifact_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = describe_artifact(&dir.path().join("gone.deb")).unwrap_err();
        assert!(matches!(err, CoreError::ArchiveScan { .. }));
    }
}
