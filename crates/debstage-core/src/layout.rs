use std::path::{Path, PathBuf};

/// Paths of the private apt tree under a caller-supplied cache root.
///
/// ```text
/// <cache_root>/apt/cache            downloaded archives (cache/archives/*.deb)
/// <cache_root>/apt/state            apt lists and working state
/// <cache_root>/apt/sources/sources.list
/// <cache_root>/apt/etc/trusted.gpg
/// ```
///
/// The install root is supplied separately by the caller and is the only
/// durable output of a run. Both roots are stored absolute: every tool runs
/// with `/` as its working directory.
#[derive(Debug, Clone)]
pub struct EnvironmentLayout {
    root: PathBuf,
    install_dir: PathBuf,
}

impl EnvironmentLayout {
    pub fn new(cache_root: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: anchor(cache_root.into()),
            install_dir: anchor(install_dir.into()),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn apt_dir(&self) -> PathBuf {
        self.root.join("apt")
    }

    #[inline]
    pub fn cache_dir(&self) -> PathBuf {
        self.apt_dir().join("cache")
    }

    #[inline]
    pub fn archives_dir(&self) -> PathBuf {
        self.cache_dir().join("archives")
    }

    #[inline]
    pub fn state_dir(&self) -> PathBuf {
        self.apt_dir().join("state")
    }

    #[inline]
    pub fn sources_list(&self) -> PathBuf {
        self.apt_dir().join("sources").join("sources.list")
    }

    #[inline]
    pub fn trusted_keys(&self) -> PathBuf {
        self.apt_dir().join("etc").join("trusted.gpg")
    }

    #[inline]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.apt_dir().join(".lock")
    }

    /// Directories setup creates. apt refuses to run without the `partial`
    /// subdirectories and curl does not create `archives` itself.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.cache_dir(),
            self.archives_dir().join("partial"),
            self.state_dir(),
            self.state_dir().join("lists").join("partial"),
            self.install_dir.clone(),
        ]
    }

    /// Options passed to every apt-get invocation so it reads and writes the
    /// private tree only. Locking is disabled because the tree is never
    /// shared with the host's apt.
    pub fn apt_options(&self) -> Vec<String> {
        vec![
            "-o".to_owned(),
            "debug::nolocking=true".to_owned(),
            "-o".to_owned(),
            format!("dir::cache={}", self.cache_dir().display()),
            "-o".to_owned(),
            format!("dir::state={}", self.state_dir().display()),
            "-o".to_owned(),
            format!("dir::etc::sourcelist={}", self.sources_list().display()),
            "-o".to_owned(),
            format!("dir::etc::trusted={}", self.trusted_keys().display()),
        ]
    }
}

/// Joins a relative path onto the current directory. Falls back to the path
/// as given when the current directory is unavailable.
fn anchor(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// Host files the private sources list and keyring are seeded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBaseline {
    pub sources_list: PathBuf,
    pub trusted_keys: PathBuf,
}

impl Default for HostBaseline {
    fn default() -> Self {
        Self {
            sources_list: PathBuf::from("/etc/apt/sources.list"),
            trusted_keys: PathBuf::from("/etc/apt/trusted.gpg"),
        }
    }
}
