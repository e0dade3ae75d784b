// Flatpak package manager wrapper
//
// Drives the `flatpak` CLI. List output is requested with explicit
// `--columns` so the tab-separated parsing below stays stable across
// flatpak versions.

use tokio_util::sync::CancellationToken;

use crate::models::BackendSettings;
use crate::services::{ServiceError, ToolRunner};

const TOOL: &str = "flatpak";

/// An installed Flatpak application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    pub app_id: String,
    pub version: String,
    pub branch: String,
    pub origin: String,
    pub reference: String,
    /// "user" or "system".
    pub installation: &'static str,
}

/// An available Flatpak update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub name: String,
    pub app_id: String,
    pub version: String,
    pub installation: &'static str,
}

/// Client for the Flatpak CLI.
#[derive(Debug, Clone)]
pub struct FlatpakClient {
    runner: ToolRunner,
}

impl FlatpakClient {
    pub fn new(settings: &BackendSettings, dry_run: bool) -> Self {
        Self {
            runner: ToolRunner::new(TOOL, settings.timeout(), dry_run),
        }
    }

    /// Whether flatpak is installed and accessible.
    pub async fn available(&self) -> bool {
        self.runner.available().await
    }

    /// List installed applications for one installation.
    pub async fn list_apps(&self, user: bool) -> Result<Vec<Application>, ServiceError> {
        let output = self
            .runner
            .run(&[
                "list",
                install_flag(user),
                "--app",
                "--columns=name,application,version,branch,origin,ref",
            ])
            .await?;
        Ok(parse_app_list(&output, user))
    }

    /// List available updates for one installation.
    pub async fn list_updates(&self, user: bool) -> Result<Vec<UpdateInfo>, ServiceError> {
        let output = self
            .runner
            .run(&[
                "remote-ls",
                "--updates",
                install_flag(user),
                "--columns=name,application,version",
            ])
            .await?;
        Ok(parse_update_list(&output, user))
    }

    /// Install an application by id.
    pub async fn install(
        &self,
        app_id: &str,
        user: bool,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        self.runner
            .run_mutating(
                &["install", "--noninteractive", "-y", install_flag(user), app_id],
                Some(token),
            )
            .await?;
        Ok(())
    }

    /// Uninstall an application by id.
    pub async fn uninstall(
        &self,
        app_id: &str,
        user: bool,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        self.runner
            .run_mutating(&["uninstall", "-y", install_flag(user), app_id], Some(token))
            .await?;
        Ok(())
    }

    /// Update one application, or everything when `app_id` is `None`.
    pub async fn update(
        &self,
        app_id: Option<&str>,
        user: bool,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let mut args = vec!["update", "-y", install_flag(user)];
        if let Some(app_id) = app_id {
            args.push(app_id);
        }
        self.runner.run_mutating(&args, Some(token)).await?;
        Ok(())
    }

    /// Names of the configured remotes for one installation.
    pub async fn remotes(&self, user: bool) -> Result<Vec<String>, ServiceError> {
        let output = self
            .runner
            .run(&["remotes", install_flag(user), "--columns=name"])
            .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn install_flag(user: bool) -> &'static str {
    if user { "--user" } else { "--system" }
}

fn installation_label(user: bool) -> &'static str {
    if user { "user" } else { "system" }
}

/// Parse `flatpak list` output. Columns are tab-separated in the order
/// requested above; short rows are tolerated, rows without an application id
/// are skipped.
fn parse_app_list(output: &str, user: bool) -> Vec<Application> {
    let installation = installation_label(user);
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() < 2 || fields[1].is_empty() {
                return None;
            }
            Some(Application {
                name: fields[0].to_string(),
                app_id: fields[1].to_string(),
                version: fields.get(2).unwrap_or(&"").to_string(),
                branch: fields.get(3).unwrap_or(&"").to_string(),
                origin: fields.get(4).unwrap_or(&"").to_string(),
                reference: fields.get(5).unwrap_or(&"").to_string(),
                installation,
            })
        })
        .collect()
}

/// Parse `flatpak remote-ls --updates` output.
fn parse_update_list(output: &str, user: bool) -> Vec<UpdateInfo> {
    let installation = installation_label(user);
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() < 2 || fields[1].is_empty() {
                return None;
            }
            Some(UpdateInfo {
                name: fields[0].to_string(),
                app_id: fields[1].to_string(),
                version: fields.get(2).unwrap_or(&"").to_string(),
                installation,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_list() {
        let output = "Firefox\torg.mozilla.firefox\t128.0\tstable\tflathub\tapp/org.mozilla.firefox/x86_64/stable\n\
                      GIMP\torg.gimp.GIMP\t2.10.38\tstable\tflathub\tapp/org.gimp.GIMP/x86_64/stable\n";

        let apps = parse_app_list(output, true);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].name, "Firefox");
        assert_eq!(apps[0].app_id, "org.mozilla.firefox");
        assert_eq!(apps[0].version, "128.0");
        assert_eq!(apps[0].origin, "flathub");
        assert_eq!(apps[0].installation, "user");
        assert_eq!(apps[1].app_id, "org.gimp.GIMP");
    }

    #[test]
    fn test_parse_app_list_skips_blank_and_short_rows() {
        let output = "\n\nOrphan\n\tmissing.name\t1.0\n";
        let apps = parse_app_list(output, false);

        // "Orphan" has no app id column; "missing.name" has an empty name but
        // a valid id and is kept.
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].app_id, "missing.name");
        assert_eq!(apps[0].installation, "system");
    }

    #[test]
    fn test_parse_app_list_tolerates_missing_trailing_columns() {
        let output = "Firefox\torg.mozilla.firefox\n";
        let apps = parse_app_list(output, true);

        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].version, "");
        assert_eq!(apps[0].reference, "");
    }

    #[test]
    fn test_parse_update_list() {
        let output = "Firefox\torg.mozilla.firefox\t129.0\n";
        let updates = parse_update_list(output, false);

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].app_id, "org.mozilla.firefox");
        assert_eq!(updates[0].version, "129.0");
        assert_eq!(updates[0].installation, "system");
    }

    #[test]
    fn test_parse_update_list_empty_output() {
        assert!(parse_update_list("", true).is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_install() {
        let client = FlatpakClient::new(&BackendSettings::default(), true);
        let token = CancellationToken::new();

        // Dry-run never touches the tool, so this passes even without
        // flatpak installed.
        client
            .install("org.mozilla.firefox", true, &token)
            .await
            .unwrap();
    }
}
