//! External tool execution.
//!
//! Every subprocess the harness starts goes through [`ToolInvoker`]: output
//! suppression, launch-failure policy and the optional watchdog live here so
//! the adapters only decide *what* to run.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::RunConfig;
use crate::error::{HarnessError, HarnessResult};

/// Exit code reported when a non-fatal tool could not be launched.
pub const LAUNCH_FAILURE_CODE: i32 = -1;

/// Exit code reported when a non-fatal tool hit the watchdog.
pub const TIMEOUT_CODE: i32 = -2;

/// How a child process ended.
///
/// Signals, watchdog expiry and launch failures are distinct variants so
/// they never compare equal to each other or to a regular exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Regular exit with this status.
    Exited(i32),
    /// Terminated by this signal number.
    Signaled(i32),
    /// Killed by the watchdog.
    TimedOut,
    /// Never started.
    LaunchFailed,
}

impl RunOutcome {
    /// Flatten into one exit code: `-signal` for signals and the sentinels
    /// for watchdog and launch failures. Only zero means success.
    pub fn code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(signal) => -signal,
            Self::TimedOut => TIMEOUT_CODE,
            Self::LaunchFailed => LAUNCH_FAILURE_CODE,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {code}"),
            Self::Signaled(signal) => write!(f, "signal {signal}"),
            Self::TimedOut => f.write_str("timeout"),
            Self::LaunchFailed => f.write_str("launch failure"),
        }
    }
}

/// What to do when a tool cannot be launched or hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Abort the caller with an error.
    Fatal,
    /// Log the problem and return a sentinel exit code.
    Continue,
}

/// One command to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Executable to start.
    pub program: PathBuf,

    /// Arguments after the executable.
    pub args: Vec<OsString>,

    /// Inherit stdout/stderr even when the run is not verbose.
    pub force_visible: bool,

    /// Launch-failure policy.
    pub failure_mode: FailureMode,

    /// Human-readable description logged on failure.
    pub error_description: Option<String>,
}

impl Invocation {
    /// A fatal, output-suppressed invocation of `program` without arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            force_visible: false,
            failure_mode: FailureMode::Fatal,
            error_description: None,
        }
    }

    /// Build an invocation from an argument vector (first element is the program).
    pub fn from_argv<I, S>(argv: I) -> HarnessResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(HarnessError::EmptyCommand)?;
        Ok(Self::new(program).args(argv))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Always show the tool's output.
    pub fn visible(mut self) -> Self {
        self.force_visible = true;
        self
    }

    /// Log and continue instead of aborting when the tool cannot run.
    pub fn non_fatal(mut self) -> Self {
        self.failure_mode = FailureMode::Continue;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// The command line as a single display string.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(|a| a.as_os_str()))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs [`Invocation`]s as child processes.
#[derive(Debug, Clone, Default)]
pub struct ToolInvoker {
    verbose: bool,
    timeout: Option<Duration>,
}

impl ToolInvoker {
    /// Create an invoker from the run configuration.
    pub fn new(config: &RunConfig) -> Self {
        Self {
            verbose: config.verbose,
            timeout: config.tool_timeout(),
        }
    }

    pub fn with_settings(verbose: bool, timeout: Option<Duration>) -> Self {
        Self { verbose, timeout }
    }

    /// Run the invocation to completion and return the child's exit code.
    ///
    /// A child terminated by a signal reports the negated signal number.
    /// Use [`ToolInvoker::execute`] when those must stay distinguishable
    /// from the sentinels.
    pub async fn run(&self, invocation: &Invocation) -> HarnessResult<i32> {
        self.execute(invocation).await.map(|outcome| outcome.code())
    }

    /// Run the invocation to completion and report how it ended.
    ///
    /// Launch failures and watchdog expiry follow the invocation's
    /// [`FailureMode`].
    pub async fn execute(&self, invocation: &Invocation) -> HarnessResult<RunOutcome> {
        if invocation.program.as_os_str().is_empty() {
            return Err(HarnessError::EmptyCommand);
        }

        let visible = self.verbose || invocation.force_visible;
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if visible {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        debug!(command = %invocation.command_line(), visible, "Running tool");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return self.launch_failed(invocation, e.to_string()),
        };

        let waited = match self.timeout {
            Some(limit) => {
                let bounded = tokio::time::timeout(limit, child.wait()).await;
                match bounded {
                    Ok(waited) => waited,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            debug!(error = %e, "Failed to kill timed out tool");
                        }
                        return self.timed_out(invocation, limit);
                    }
                }
            }
            None => child.wait().await,
        };

        match waited {
            Ok(status) => Ok(outcome_of(status)),
            Err(e) => self.launch_failed(invocation, e.to_string()),
        }
    }

    fn launch_failed(&self, invocation: &Invocation, reason: String) -> HarnessResult<RunOutcome> {
        let command = invocation.command_line();
        match invocation.failure_mode {
            FailureMode::Fatal => Err(HarnessError::LaunchFailure { command, reason }),
            FailureMode::Continue => {
                log_failure(invocation, &reason);
                Ok(RunOutcome::LaunchFailed)
            }
        }
    }

    fn timed_out(&self, invocation: &Invocation, limit: Duration) -> HarnessResult<RunOutcome> {
        let command = invocation.command_line();
        match invocation.failure_mode {
            FailureMode::Fatal => Err(HarnessError::Timeout {
                command,
                limit_secs: limit.as_secs(),
            }),
            FailureMode::Continue => {
                log_failure(
                    invocation,
                    &format!("timed out after {} seconds", limit.as_secs()),
                );
                Ok(RunOutcome::TimedOut)
            }
        }
    }
}

fn log_failure(invocation: &Invocation, reason: &str) {
    match &invocation.error_description {
        Some(description) => error!(
            command = %invocation.command_line(),
            reason = %reason,
            "Error: {}",
            description
        ),
        None => error!(
            reason = %reason,
            "Error: Cannot run {}",
            invocation.command_line()
        ),
    }
}

fn outcome_of(status: ExitStatus) -> RunOutcome {
    if let Some(code) = status.code() {
        return RunOutcome::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return RunOutcome::Signaled(signal);
        }
    }
    RunOutcome::LaunchFailed
}
