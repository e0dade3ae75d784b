// OS image update wrapper
//
// Drives `nbc`, the bootc container installer, for checking and applying
// system image updates. Applying streams the tool's stdout line by line and
// turns recognizable progress lines into (fraction, message) callbacks so a
// tracked operation can show a real progress bar.

use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::services::{ServiceError, ToolRunner};

const TOOL: &str = "nbc";

/// Image updates can take a long time: big layers over slow links.
const UPDATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Short timeout for status and check queries.
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// `nbc status --json` output, reduced to what the UI shows.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub staged: Option<String>,
}

/// `nbc update --check --json` output.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UpdateCheck {
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub latest_version: String,
}

/// Client for the nbc CLI.
#[derive(Debug, Clone)]
pub struct OsImageClient {
    runner: ToolRunner,

    /// Matches "Downloading layer 3/7" style step lines.
    step_pattern: Regex,

    /// Matches percentage progress lines, e.g. "Fetching ostree chunk: 42%".
    percent_pattern: Regex,
}

impl OsImageClient {
    pub fn new(dry_run: bool) -> Self {
        Self {
            runner: ToolRunner::new(TOOL, QUERY_TIMEOUT, dry_run),
            step_pattern: Regex::new(r"(\d+)\s*/\s*(\d+)").expect("invalid step regex"),
            percent_pattern: Regex::new(r"(\d{1,3})%").expect("invalid percent regex"),
        }
    }

    /// Whether nbc is installed and accessible.
    pub async fn available(&self) -> bool {
        self.runner.available().await
    }

    /// Current deployment status.
    pub async fn status(&self) -> Result<StatusReport, ServiceError> {
        let output = self.runner.run(&["status", "--json"]).await?;
        serde_json::from_str(&output).map_err(|err| ServiceError::ParseFailed {
            tool: TOOL,
            reason: err.to_string(),
        })
    }

    /// Ask the registry whether a newer image exists.
    pub async fn check_update(&self) -> Result<UpdateCheck, ServiceError> {
        let output = self.runner.run(&["update", "--check", "--json"]).await?;
        serde_json::from_str(&output).map_err(|err| ServiceError::ParseFailed {
            tool: TOOL,
            reason: err.to_string(),
        })
    }

    /// Download and stage the newest image, reporting progress as it goes.
    ///
    /// `progress` receives a completion fraction (or the last known one when
    /// a line carries no number) and the raw status line. Cancellation kills
    /// the child process.
    pub async fn apply_update(
        &self,
        token: &CancellationToken,
        mut progress: impl FnMut(f32, &str),
    ) -> Result<(), ServiceError> {
        if self.runner.dry_run() {
            tracing::info!(tool = TOOL, "dry-run: skipping image update");
            progress(1.0, "Dry run: no update applied");
            return Ok(());
        }

        let mut child = Command::new(TOOL)
            .args(["update", "--apply"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ServiceError::ToolMissing(TOOL)
                } else {
                    ServiceError::Io { tool: TOOL, source }
                }
            })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let mut lines = BufReader::new(stdout).lines();
        let mut last_fraction = 0.0f32;

        let deadline = tokio::time::sleep(UPDATE_TIMEOUT);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = child.kill().await;
                    return Err(ServiceError::Cancelled(TOOL));
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(ServiceError::Timeout { tool: TOOL, timeout: UPDATE_TIMEOUT });
                }
                line = lines.next_line() => {
                    match line.map_err(|source| ServiceError::Io { tool: TOOL, source })? {
                        Some(line) => {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if let Some(fraction) = self.parse_progress(line) {
                                last_fraction = fraction;
                            }
                            progress(last_fraction, line);
                        }
                        None => break,
                    }
                }
            }
        }

        let mut stderr_buf = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_buf).await;
        }
        let status = child
            .wait()
            .await
            .map_err(|source| ServiceError::Io { tool: TOOL, source })?;

        if !status.success() {
            return Err(ServiceError::CommandFailed {
                tool: TOOL,
                code: status.code().unwrap_or(-1),
                stderr: stderr_buf.trim().to_string(),
            });
        }

        progress(1.0, "Update staged; reboot to apply");
        Ok(())
    }

    /// Extract a completion fraction from one output line, if it carries one.
    fn parse_progress(&self, line: &str) -> Option<f32> {
        if let Some(caps) = self.percent_pattern.captures(line) {
            let percent: f32 = caps[1].parse().ok()?;
            if percent <= 100.0 {
                return Some(percent / 100.0);
            }
        }
        if let Some(caps) = self.step_pattern.captures(line) {
            let step: f32 = caps[1].parse().ok()?;
            let total: f32 = caps[2].parse().ok()?;
            if total > 0.0 && step <= total {
                return Some(step / total);
            }
        }
        None
    }
}
