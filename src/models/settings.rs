use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User settings from `basecamp.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Log every state-changing command without executing it.
    #[serde(default)]
    pub dry_run: bool,

    /// Ask for confirmation before cancelling a running operation.
    #[serde(default = "default_true")]
    pub confirm_cancellation: bool,

    /// OS image update channel (e.g. "stable", "testing").
    #[serde(default = "default_update_channel")]
    pub update_channel: String,

    #[serde(default)]
    pub flatpak: BackendSettings,

    #[serde(default)]
    pub homebrew: BackendSettings,

    #[serde(default)]
    pub snap: BackendSettings,

    /// Named Brewfile bundle locations, in display order.
    #[serde(default = "default_bundles")]
    pub bundles: IndexMap<String, String>,
}

/// Per-package-backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout for state-changing commands, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
}

impl BackendSettings {
    /// The command timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command_timeout: default_command_timeout(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dry_run: false,
            confirm_cancellation: true,
            update_channel: default_update_channel(),
            flatpak: BackendSettings::default(),
            homebrew: BackendSettings::default(),
            snap: BackendSettings::default(),
            bundles: default_bundles(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_update_channel() -> String {
    "stable".to_string()
}

fn default_command_timeout() -> u64 {
    300
}

fn default_bundles() -> IndexMap<String, String> {
    let mut bundles = IndexMap::new();
    bundles.insert(
        "system".to_string(),
        "/usr/share/basecamp/bundles/Brewfile".to_string(),
    );
    bundles
}
