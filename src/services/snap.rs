// Snap package manager wrapper
//
// Minimal `snap` CLI surface: availability, listing, install. Snap has no
// machine-readable list output, so the column layout of `snap list` is
// parsed by whitespace with the header row skipped.

use tokio_util::sync::CancellationToken;

use crate::models::BackendSettings;
use crate::services::{ServiceError, ToolRunner};

const TOOL: &str = "snap";

/// An installed snap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snap {
    pub name: String,
    pub version: String,
    pub revision: String,
    pub tracking: String,
    pub publisher: String,
}

/// Client for the snap CLI.
#[derive(Debug, Clone)]
pub struct SnapClient {
    runner: ToolRunner,
}

impl SnapClient {
    pub fn new(settings: &BackendSettings, dry_run: bool) -> Self {
        Self {
            runner: ToolRunner::new(TOOL, settings.timeout(), dry_run),
        }
    }

    /// Whether snapd is installed and accessible.
    pub async fn available(&self) -> bool {
        self.runner.available().await
    }

    /// List installed snaps.
    pub async fn installed(&self) -> Result<Vec<Snap>, ServiceError> {
        let output = self.runner.run(&["list"]).await?;
        Ok(parse_snap_list(&output))
    }

    /// Whether a snap with this name is installed.
    pub async fn is_installed(&self, name: &str) -> Result<bool, ServiceError> {
        Ok(self.installed().await?.iter().any(|snap| snap.name == name))
    }

    /// Install a snap by name.
    pub async fn install(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        self.runner
            .run_mutating(&["install", name], Some(token))
            .await?;
        Ok(())
    }
}

/// Parse `snap list`: a header row, then whitespace-separated columns
/// Name / Version / Rev / Tracking / Publisher / Notes.
fn parse_snap_list(output: &str) -> Vec<Snap> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            Some(Snap {
                name: fields[0].to_string(),
                version: fields[1].to_string(),
                revision: fields[2].to_string(),
                tracking: fields[3].to_string(),
                publisher: fields[4].to_string(),
            })
        })
        .collect()
}
