use crate::invocation::Invocation;
use crate::runner::{CommandOutput, CommandRunner};
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type Hook = Box<dyn Fn(&Invocation) -> std::io::Result<()> + Send + Sync>;

/// Recording runner for tests.
///
/// Every call is recorded before anything else happens, so a simulated
/// failure still shows up in [`invocations`](Self::invocations). Calls are
/// numbered from 1.
#[derive(Default)]
pub struct MockRunner {
    calls: Mutex<Vec<Invocation>>,
    fail_on: Option<usize>,
    output: String,
    hook: Option<Hook>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th invocation (1-based) with exit status 1.
    #[must_use]
    pub fn fail_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Output returned by every successful call.
    #[must_use]
    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_owned();
        self
    }

    #[must_use]
    pub fn with_hook(
        mut self,
        hook: impl Fn(&Invocation) -> std::io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Materialise the files curl and `apt-get -d install` would download.
    #[must_use]
    pub fn simulating_downloads(self) -> Self {
        self.with_hook(simulate_download)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.program).collect()
    }
}

impl CommandRunner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, RuntimeError> {
        let n = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|e| RuntimeError::Io(std::io::Error::other(format!("mutex poisoned: {e}"))))?;
            calls.push(invocation.clone());
            calls.len()
        };

        if self.fail_on == Some(n) {
            return Err(RuntimeError::NonZeroExit {
                invocation: invocation.to_string(),
                code: 1,
                output: format!("mock failure on call {n}"),
            });
        }

        if let Some(hook) = &self.hook {
            hook(invocation)?;
        }

        Ok(CommandOutput {
            combined: self.output.clone(),
            code: 0,
        })
    }
}

fn simulate_download(inv: &Invocation) -> std::io::Result<()> {
    match inv.program.as_str() {
        "curl" => {
            if let Some(dest) = inv.value_of("-o") {
                touch(Path::new(dest), b"mock artifact")?;
            }
        }
        "apt-get" if inv.has_arg("-d") && inv.has_arg("install") => {
            let Some(cache) = inv
                .args
                .iter()
                .find_map(|a| a.strip_prefix("dir::cache="))
                .map(PathBuf::from)
            else {
                return Ok(());
            };
            let names = inv
                .args
                .iter()
                .skip_while(|a| a.as_str() != "--reinstall")
                .skip(1);
            for name in names {
                let file = cache.join("archives").join(format!("{name}_0.0.0-mock_all.deb"));
                touch(&file, name.as_bytes())?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn touch(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}
