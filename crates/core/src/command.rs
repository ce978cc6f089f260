//! Synchronous execution of short-lived shell commands.
//!
//! Commands are full shell command lines (quoting, pipes and `&&` work as
//! they would in a terminal) executed with `sh -c`. The working directory is
//! always passed per call; the harness never changes its own current
//! directory.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, warn};

/// Shell used to interpret command lines.
pub const SHELL: &str = "sh";

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Raw standard error.
    pub stderr: Vec<u8>,
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output decoded lossily as UTF-8.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Standard output followed by standard error.
    pub fn combined_lossy(&self) -> String {
        let mut combined = self.stdout_lossy();
        combined.push_str(&self.stderr_lossy());
        combined
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code(),
        }
    }
}

/// Runs a command line to completion.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    working_dir: Option<PathBuf>,
    tolerate_failure: bool,
}

impl CommandRunner {
    /// Create a runner using the current directory that fails on non-zero exit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands in `dir`.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Optionally run commands in `dir`.
    pub fn maybe_working_dir(mut self, dir: Option<&Path>) -> Self {
        self.working_dir = dir.map(Path::to_path_buf);
        self
    }

    /// Return the captured output even when the command exits non-zero.
    pub fn tolerate_failure(mut self, tolerate: bool) -> Self {
        self.tolerate_failure = tolerate;
        self
    }

    /// Execute `command` and wait for it to finish.
    ///
    /// # Errors
    ///
    /// [`Error::Spawn`] if the shell cannot be started and
    /// [`Error::CommandExecution`] on a non-zero exit unless failures are
    /// tolerated.
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(SHELL);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(command, working_dir = ?self.working_dir, "running command");

        let output: CommandOutput = cmd
            .output()
            .map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })?
            .into();

        if !output.success() {
            if self.tolerate_failure {
                warn!(command, exit_code = ?output.exit_code, "command failed, continuing");
            } else {
                return Err(Error::CommandExecution {
                    command: command.to_string(),
                    exit_code: output.exit_code,
                    stderr: output.stderr_lossy(),
                });
            }
        }

        Ok(output)
    }
}

/// Run `command` in an optional working directory, failing on non-zero exit.
pub fn run_command(command: &str, working_dir: Option<&Path>) -> Result<CommandOutput> {
    CommandRunner::new().maybe_working_dir(working_dir).run(command)
}
