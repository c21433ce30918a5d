//! Running a single shell command.
//!
//! Commands run through `bash -lc` so the login profile (PATH, tool shims,
//! exported credentials) applies the same way it does in an interactive
//! session. There is no timeout: a command that never exits blocks its
//! directory's tree forever.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

/// Why a command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("exit status {0}")]
    ExitStatus(i32),

    #[error("terminated by signal")]
    Signal,

    #[error("failed to spawn: {0}")]
    Spawn(String),
}

/// Captured output plus the success/failure of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub output: String,
    pub status: Result<(), RunError>,
}

impl RunResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status: Ok(()),
        }
    }

    pub fn failure(output: impl Into<String>, err: RunError) -> Self {
        Self {
            output: output.into(),
            status: Err(err),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_ok()
    }
}

/// Executes one shell command in a working directory.
///
/// Implementations never panic on command failure; a non-zero exit is
/// reported through [`RunResult::status`] and the caller decides what to do.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, dir: &str) -> RunResult;
}

/// Runs commands via `bash -lc`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }

    /// Use a different shell binary. It must accept `-lc <command>`.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    /// Spawn `command` with stdout and stderr sharing one pipe, so the
    /// captured text keeps the order the process wrote it in.
    fn spawn_combined(&self, command: &str, dir: &str) -> io::Result<(Vec<u8>, ExitStatus)> {
        let (mut reader, writer) = os_pipe::pipe()?;
        let writer_err = writer.try_clone()?;

        let mut cmd = Command::new(&self.shell);
        cmd.args(["-lc", command])
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err);
        if !dir.is_empty() {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn()?;
        // The Command still owns the write ends; close them so the read sees EOF.
        drop(cmd);

        let mut output = Vec::new();
        reader.read_to_end(&mut output)?;
        let status = child.wait()?;
        Ok((output, status))
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, dir: &str) -> RunResult {
        let (output, status) = match self.spawn_combined(command, dir) {
            Ok(done) => done,
            Err(e) => return RunResult::failure(String::new(), RunError::Spawn(e.to_string())),
        };

        let combined = String::from_utf8_lossy(&output).into_owned();
        if status.success() {
            return RunResult::success(combined);
        }
        let err = match status.code() {
            Some(code) => RunError::ExitStatus(code),
            None => RunError::Signal,
        };
        RunResult::failure(combined, err)
    }
}
