use crate::errors::{DriverError, Result};
use crate::traits::ProcessRunner;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// stdout/stderr are collected into [`ProcessOutput`]
    Capture,
    /// stdout/stderr stream straight to the terminal
    Inherit,
}

/// One fully resolved external process call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub output: OutputMode,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            output: OutputMode::Capture,
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub const fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Space-joined command line, for display only.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }

    /// Turns a non-zero exit into [`DriverError::ProcessFailed`].
    pub fn into_result(self, program: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(DriverError::ProcessFailed {
            program: program.to_string(),
            status: self.status_text(),
            stderr: self.stderr,
        })
    }
}

/// Builds invocations of project scripts through one interpreter.
///
/// Every script runs with the project root as working directory so that its
/// own relative imports and `./models`-style paths resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    pub interpreter: PathBuf,
    pub project_root: PathBuf,
    pub timeout: Option<Duration>,
}

impl Launcher {
    pub fn new(interpreter: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            project_root: project_root.into(),
            timeout: None,
        }
    }

    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(&self, script: &Path, args: Vec<String>, output: OutputMode) -> Invocation {
        Invocation::new(&self.interpreter, &self.project_root)
            .args([script.display().to_string()])
            .args(args)
            .with_output(output)
            .with_timeout(self.timeout)
    }
}

/// Runs invocations as real child processes, one at a time.
///
/// Children are spawned with `kill_on_drop`, so a timeout or an abandoned
/// future terminates the child instead of leaving it running.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        debug!(command = %invocation.command_line(), cwd = %invocation.cwd.display(), "spawning");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        match invocation.output {
            OutputMode::Capture => command.stdout(Stdio::piped()).stderr(Stdio::piped()),
            OutputMode::Inherit => command.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
        };

        let spawn_error = |source| DriverError::Spawn {
            program: invocation.program_name(),
            source,
        };
        let child = command.spawn().map_err(spawn_error)?;

        let output = match invocation.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    return Err(DriverError::Timeout {
                        program: invocation.program_name(),
                        secs: limit.as_secs(),
                    })
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(spawn_error)?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
