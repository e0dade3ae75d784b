// Homebrew package manager wrapper
//
// Drives the `brew` CLI. Listings use the JSON v2 output, which is the only
// stable machine-readable interface brew offers.

use camino::Utf8Path;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::models::BackendSettings;
use crate::services::{ServiceError, ToolRunner};

const TOOL: &str = "brew";

/// An installed Homebrew package (formula or cask).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub description: String,
    pub cask: bool,
}

/// A package with an available upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedPackage {
    pub name: String,
    pub installed_version: String,
    pub current_version: String,
    pub cask: bool,
}

/// Client for the Homebrew CLI.
#[derive(Debug, Clone)]
pub struct BrewClient {
    runner: ToolRunner,
}

impl BrewClient {
    pub fn new(settings: &BackendSettings, dry_run: bool) -> Self {
        Self {
            runner: ToolRunner::new(TOOL, settings.timeout(), dry_run),
        }
    }

    /// Whether brew is installed and accessible.
    pub async fn available(&self) -> bool {
        self.runner.available().await
    }

    /// All installed formulae and casks.
    pub async fn installed(&self) -> Result<Vec<Package>, ServiceError> {
        let output = self
            .runner
            .run(&["info", "--json=v2", "--installed"])
            .await?;
        parse_installed(&output)
    }

    /// Packages with a newer version available.
    pub async fn outdated(&self) -> Result<Vec<OutdatedPackage>, ServiceError> {
        let output = self.runner.run(&["outdated", "--json=v2"]).await?;
        parse_outdated(&output)
    }

    /// Install a formula or cask.
    pub async fn install(
        &self,
        name: &str,
        cask: bool,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let mut args = vec!["install"];
        if cask {
            args.push("--cask");
        }
        args.push(name);
        self.runner.run_mutating(&args, Some(token)).await?;
        Ok(())
    }

    /// Uninstall a formula or cask.
    pub async fn uninstall(
        &self,
        name: &str,
        cask: bool,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let mut args = vec!["uninstall"];
        if cask {
            args.push("--cask");
        }
        args.push(name);
        self.runner.run_mutating(&args, Some(token)).await?;
        Ok(())
    }

    /// Upgrade one package, or everything when `name` is `None`.
    pub async fn upgrade(
        &self,
        name: Option<&str>,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let mut args = vec!["upgrade"];
        if let Some(name) = name {
            args.push(name);
        }
        self.runner.run_mutating(&args, Some(token)).await?;
        Ok(())
    }

    /// Refresh brew's package metadata.
    pub async fn update(&self, token: &CancellationToken) -> Result<(), ServiceError> {
        self.runner.run_mutating(&["update"], Some(token)).await?;
        Ok(())
    }

    /// Write the installed packages to a Brewfile.
    pub async fn bundle_dump(
        &self,
        path: &Utf8Path,
        force: bool,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let mut args = vec!["bundle", "dump", "--file", path.as_str()];
        if force {
            args.push("--force");
        }
        self.runner.run_mutating(&args, Some(token)).await?;
        Ok(())
    }

    /// Install everything listed in a Brewfile.
    pub async fn bundle_install(
        &self,
        path: &Utf8Path,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        self.runner
            .run_mutating(&["bundle", "install", "--file", path.as_str()], Some(token))
            .await?;
        Ok(())
    }
}

// `brew info --json=v2 --installed` payload, reduced to what we display.

#[derive(Deserialize)]
struct InfoPayload {
    #[serde(default)]
    formulae: Vec<FormulaInfo>,
    #[serde(default)]
    casks: Vec<CaskInfo>,
}

#[derive(Deserialize)]
struct FormulaInfo {
    name: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    installed: Vec<InstalledVersion>,
}

#[derive(Deserialize)]
struct InstalledVersion {
    version: String,
}

#[derive(Deserialize)]
struct CaskInfo {
    token: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

fn parse_installed(json: &str) -> Result<Vec<Package>, ServiceError> {
    let payload: InfoPayload = serde_json::from_str(json).map_err(|err| {
        ServiceError::ParseFailed {
            tool: TOOL,
            reason: err.to_string(),
        }
    })?;

    let mut packages = Vec::new();
    for formula in payload.formulae {
        packages.push(Package {
            version: formula
                .installed
                .first()
                .map(|v| v.version.clone())
                .unwrap_or_default(),
            name: formula.name,
            description: formula.desc.unwrap_or_default(),
            cask: false,
        });
    }
    for cask in payload.casks {
        packages.push(Package {
            name: cask.token,
            version: cask.version.unwrap_or_default(),
            description: cask.desc.unwrap_or_default(),
            cask: true,
        });
    }
    Ok(packages)
}

// `brew outdated --json=v2` payload.

#[derive(Deserialize)]
struct OutdatedPayload {
    #[serde(default)]
    formulae: Vec<OutdatedEntry>,
    #[serde(default)]
    casks: Vec<OutdatedEntry>,
}

#[derive(Deserialize)]
struct OutdatedEntry {
    name: String,
    #[serde(default)]
    installed_versions: Vec<String>,
    #[serde(default)]
    current_version: String,
}

fn parse_outdated(json: &str) -> Result<Vec<OutdatedPackage>, ServiceError> {
    let payload: OutdatedPayload = serde_json::from_str(json).map_err(|err| {
        ServiceError::ParseFailed {
            tool: TOOL,
            reason: err.to_string(),
        }
    })?;

    let convert = |entry: OutdatedEntry, cask: bool| OutdatedPackage {
        installed_version: entry.installed_versions.first().cloned().unwrap_or_default(),
        current_version: entry.current_version,
        name: entry.name,
        cask,
    };

    let mut packages = Vec::new();
    for entry in payload.formulae {
        packages.push(convert(entry, false));
    }
    for entry in payload.casks {
        packages.push(convert(entry, true));
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed() {
        let json = r#"{
            "formulae": [
                {
                    "name": "ripgrep",
                    "desc": "Search tool like grep",
                    "installed": [{"version": "14.1.0"}]
                }
            ],
            "casks": [
                {
                    "token": "alacritty",
                    "desc": "GPU-accelerated terminal emulator",
                    "version": "0.13.2"
                }
            ]
        }"#;

        let packages = parse_installed(json).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "ripgrep");
        assert_eq!(packages[0].version, "14.1.0");
        assert!(!packages[0].cask);
        assert_eq!(packages[1].name, "alacritty");
        assert!(packages[1].cask);
    }

    #[test]
    fn test_parse_installed_handles_missing_fields() {
        let json = r#"{"formulae": [{"name": "bare"}], "casks": []}"#;

        let packages = parse_installed(json).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].version, "");
        assert_eq!(packages[0].description, "");
    }

    #[test]
    fn test_parse_installed_rejects_bad_json() {
        let err = parse_installed("not json").unwrap_err();
        assert!(matches!(err, ServiceError::ParseFailed { .. }));
    }

    #[test]
    fn test_parse_outdated() {
        let json = r#"{
            "formulae": [
                {"name": "ripgrep", "installed_versions": ["14.0.0"], "current_version": "14.1.0"}
            ],
            "casks": [
                {"name": "alacritty", "installed_versions": ["0.12.0"], "current_version": "0.13.2"}
            ]
        }"#;

        let outdated = parse_outdated(json).unwrap();
        assert_eq!(outdated.len(), 2);
        assert_eq!(outdated[0].name, "ripgrep");
        assert_eq!(outdated[0].installed_version, "14.0.0");
        assert_eq!(outdated[0].current_version, "14.1.0");
        assert!(outdated[1].cask);
    }

    #[tokio::test]
    async fn test_dry_run_upgrade() {
        let client = BrewClient::new(&BackendSettings::default(), true);
        client
            .upgrade(None, &CancellationToken::new())
            .await
            .unwrap();
    }
}
