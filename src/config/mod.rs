use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Loads and saves the user settings file (`basecamp.yaml`).
///
/// Missing files are not an error: the manager falls back to defaults so a
/// fresh install starts with a sensible configuration and writes the file on
/// the first save.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl SettingsManager {
    /// Create a SettingsManager rooted at `config_dir`, creating the
    /// directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {config_dir}"))?;
        }

        Ok(Self {
            settings_path: config_dir.join("basecamp.yaml"),
            config_dir,
        })
    }

    /// The per-user default configuration directory
    /// (`$XDG_CONFIG_HOME/basecamp` on Linux).
    pub fn default_dir() -> Result<Utf8PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "frostyard", "basecamp")
            .context("Could not determine a home directory for configuration")?;
        Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf())
            .map_err(|path| anyhow::anyhow!("Config directory is not valid UTF-8: {path:?}"))
    }

    /// Load settings, or defaults if the file does not exist yet.
    pub fn load(&self) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "settings file not found at {}, using defaults",
                self.settings_path
            );
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: Settings = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save settings to disk.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let yaml =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("saved settings to {}", self.settings_path);
        Ok(())
    }

    /// The configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
