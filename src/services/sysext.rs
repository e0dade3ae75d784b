// systemd-sysext extension wrapper
//
// Drives `updex` for listing and updating sysext extensions. updex speaks
// JSON on stdout, so no column parsing is needed here.

use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::services::{ServiceError, ToolRunner};

const TOOL: &str = "updex";

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One extension version as reported by `updex list --json`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Extension {
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub current: bool,
}

/// Client for the updex CLI.
#[derive(Debug, Clone)]
pub struct SysextClient {
    runner: ToolRunner,
}

impl SysextClient {
    pub fn new(dry_run: bool) -> Self {
        Self {
            runner: ToolRunner::new(TOOL, COMMAND_TIMEOUT, dry_run),
        }
    }

    /// Whether updex is installed and accessible.
    pub async fn available(&self) -> bool {
        self.runner.available().await
    }

    /// All extensions, installed and available.
    pub async fn list(&self) -> Result<Vec<Extension>, ServiceError> {
        let output = self.runner.run(&["list", "--json"]).await?;
        parse_extension_list(&output)
    }

    /// Only the installed extensions.
    pub async fn installed(&self) -> Result<Vec<Extension>, ServiceError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|ext| ext.installed)
            .collect())
    }

    /// Re-merge the extension tree (after installing or removing one).
    pub async fn refresh(&self, token: &CancellationToken) -> Result<(), ServiceError> {
        self.runner.run_mutating(&["refresh"], Some(token)).await?;
        Ok(())
    }

    /// Update one component to its latest available version.
    pub async fn update(
        &self,
        component: &str,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        self.runner
            .run_mutating(&["update", component], Some(token))
            .await?;
        Ok(())
    }
}

fn parse_extension_list(json: &str) -> Result<Vec<Extension>, ServiceError> {
    serde_json::from_str(json).map_err(|err| ServiceError::ParseFailed {
        tool: TOOL,
        reason: err.to_string(),
    })
}
