use crate::invocation::Invocation;
use crate::RuntimeError;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound on a single external invocation unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout and stderr interleaved as the child wrote them.
    pub combined: String,
    pub code: i32,
}

/// Capability to run an external program to completion and capture its output.
///
/// Implementations block until the child exits. A non-zero exit is an error
/// (`RuntimeError::NonZeroExit`) that still carries the captured output.
pub trait CommandRunner: Send + Sync {
    fn name(&self) -> &str;

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, RuntimeError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, RuntimeError> {
        (**self).output(invocation)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, RuntimeError> {
        (**self).output(invocation)
    }
}

/// Runs invocations on the host through `duct`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CommandRunner for SystemRunner {
    fn name(&self) -> &'static str {
        "system"
    }

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, RuntimeError> {
        debug!("exec: {invocation}");
        let handle = duct::cmd(&invocation.program, &invocation.args)
            .dir(&invocation.working_dir)
            .stdin_null()
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .start()
            .map_err(|e| RuntimeError::Spawn {
                program: invocation.program.clone(),
                source: e,
            })?;

        let started = Instant::now();
        let (combined, code) = loop {
            if let Some(out) = handle.try_wait()? {
                break (
                    String::from_utf8_lossy(&out.stdout).into_owned(),
                    out.status.code(),
                );
            }
            if started.elapsed() >= self.timeout {
                warn!(
                    "killing '{invocation}' after {}s",
                    self.timeout.as_secs()
                );
                handle.kill()?;
                let partial = handle
                    .wait()
                    .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
                    .unwrap_or_default();
                return Err(RuntimeError::TimedOut {
                    invocation: invocation.to_string(),
                    after: self.timeout,
                    output: partial,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        // Killed by a signal reports no code.
        let code = code.unwrap_or(-1);
        if code != 0 {
            return Err(RuntimeError::NonZeroExit {
                invocation: invocation.to_string(),
                code,
                output: combined,
            });
        }
        Ok(CommandOutput { combined, code })
    }
}

/// Logs and records invocations without executing anything.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    recorded: Mutex<Vec<Invocation>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Invocation> {
        self.recorded
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for DryRunRunner {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput, RuntimeError> {
        info!("would run: {invocation}");
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(invocation.clone());
        }
        Ok(CommandOutput::default())
    }
}
