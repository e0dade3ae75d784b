//! Wrappers around the external command-line tools Basecamp drives.
//!
//! Each backend gets a small client struct over a shared [`ToolRunner`] that
//! handles timeouts, dry-run mode, cooperative cancellation, and the usual
//! error taxonomy (tool missing, non-zero exit, timeout). Output parsing is
//! kept in pure functions so it can be tested without the tools installed.

pub mod flatpak;
pub mod homebrew;
pub mod osimage;
pub mod snap;
pub mod sysext;

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How long availability probes (`<tool> --version`) may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from driving an external tool.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} is not installed")]
    ToolMissing(&'static str),

    #[error("{tool} timed out after {timeout:?}")]
    Timeout {
        tool: &'static str,
        timeout: Duration,
    },

    #[error("{0} was cancelled")]
    Cancelled(&'static str),

    #[error("{tool} failed (exit {code}): {stderr}")]
    CommandFailed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("failed to parse {tool} output: {reason}")]
    ParseFailed {
        tool: &'static str,
        reason: String,
    },

    #[error("i/o error running {tool}")]
    Io {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Executes one external tool with a fixed timeout and dry-run policy.
#[derive(Debug, Clone)]
pub(crate) struct ToolRunner {
    tool: &'static str,
    timeout: Duration,
    dry_run: bool,
}

impl ToolRunner {
    pub fn new(tool: &'static str, timeout: Duration, dry_run: bool) -> Self {
        Self {
            tool,
            timeout,
            dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Whether the tool is installed and answers `--version`.
    pub async fn available(&self) -> bool {
        let result = Command::new(self.tool)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, result).await,
            Ok(Ok(status)) if status.success()
        )
    }

    /// Run a read-only command and return its stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, ServiceError> {
        self.execute(args, None).await
    }

    /// Run a state-changing command. Honors dry-run mode (log and skip) and
    /// aborts when `token` is cancelled.
    pub async fn run_mutating(
        &self,
        args: &[&str],
        token: Option<&CancellationToken>,
    ) -> Result<String, ServiceError> {
        if self.dry_run {
            tracing::info!(tool = self.tool, ?args, "dry-run: skipping command");
            return Ok(String::new());
        }
        self.execute(args, token).await
    }

    async fn execute(
        &self,
        args: &[&str],
        token: Option<&CancellationToken>,
    ) -> Result<String, ServiceError> {
        tracing::debug!(tool = self.tool, ?args, "running command");

        let mut cmd = Command::new(self.tool);
        cmd.args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd.output();
        let output = if let Some(token) = token {
            tokio::select! {
                _ = token.cancelled() => return Err(ServiceError::Cancelled(self.tool)),
                result = tokio::time::timeout(self.timeout, output) => result,
            }
        } else {
            tokio::time::timeout(self.timeout, output).await
        };

        let output = output
            .map_err(|_| ServiceError::Timeout {
                tool: self.tool,
                timeout: self.timeout,
            })?
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ServiceError::ToolMissing(self.tool)
                } else {
                    ServiceError::Io {
                        tool: self.tool,
                        source,
                    }
                }
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!(tool = self.tool, stderr = %stderr.trim(), "command stderr");
        }

        if !output.status.success() {
            return Err(ServiceError::CommandFailed {
                tool: self.tool,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
