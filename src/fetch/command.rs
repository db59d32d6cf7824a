//! External command abstraction.
//!
//! Subprocess-based acquisition never assumes a clean exit: every invocation
//! carries an argument list, an optional working directory, a hard
//! wall-clock timeout and a forced-kill path when that timeout fires.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of an external command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process exceeded its wall-clock budget and was killed
    #[error("`{program}` timed out after {timeout_secs}s")]
    Timeout {
        /// Program that was killed
        program: String,
        /// Budget that was exceeded
        timeout_secs: u64,
    },
    /// The process could not be spawned or its output collected
    #[error("failed to run `{program}`: {source}")]
    Io {
        /// Program that failed
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    /// Exit code, when the process exited normally
    pub code: Option<i32>,
    /// Captured standard output (lossy UTF-8)
    pub stdout: String,
    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
}

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ExternalCommand {
    /// Default wall-clock budget when none is configured.
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Start building an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the process inside `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set the hard wall-clock budget.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run to completion, capturing output.
    ///
    /// On timeout the wait future is dropped, which kills the child via
    /// `kill_on_drop` (SIGKILL), so the process never outlives its budget.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Timeout`] on budget exhaustion and
    /// [`CommandError::Io`] when spawning or collection fails. A non-zero
    /// exit status is not an error here; callers inspect
    /// [`CommandOutput::success`].
    pub async fn run(&self) -> Result<CommandOutput, CommandError> {
        debug!(program = %self.program, args = ?self.args, "Spawning external command");

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| CommandError::Io {
            program: self.program.clone(),
            source,
        })?;

        let waited = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let output = match waited {
            Ok(result) => result.map_err(|source| CommandError::Io {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!(program = %self.program, timeout_secs = self.timeout.as_secs(), "External command timed out, killing");
                return Err(CommandError::Timeout {
                    program: self.program.clone(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            program = %self.program,
            success = result.success,
            code = ?result.code,
            "External command finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_captures_output() -> Result<(), CommandError> {
        let out = ExternalCommand::new("echo").arg("hello").run().await?;
        assert!(out.success);
        assert_eq!(out.code, Some(0));
        assert_eq!(out.stdout.trim(), "hello");
        Ok(())
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_reports_nonzero_exit() -> Result<(), CommandError> {
        let out = ExternalCommand::new("false").run().await?;
        assert!(!out.success);
        Ok(())
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_kills_on_timeout() {
        let result = ExternalCommand::new("sleep")
            .arg("30")
            .timeout(Duration::from_millis(100))
            .run()
            .await;
        match result {
            Err(CommandError::Timeout { program, .. }) => assert_eq!(program, "sleep"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program_is_io_error() {
        let result = ExternalCommand::new("definitely-not-a-real-binary-7f3a")
            .run()
            .await;
        assert!(matches!(result, Err(CommandError::Io { .. })));
    }
}
