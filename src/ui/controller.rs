// GUI controller
//
// Wires the Slint window to the rest of the application:
// - Slint callbacks (button clicks) start registry-tracked background jobs
// - a registry listener rebuilds the operations panel on every change
// - cancel requests go through a confirmation dialog before taking effect
// - retry buttons invoke the failed operation's retry hook
//
// The listener re-reads active()/history()/active_count() and rebuilds the
// row models wholesale instead of patching deltas. Operations number in the
// tens at most, and a full repoll can never drift out of sync with the
// registry.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use slint::{ComponentHandle, ModelRc, VecModel};
use tokio::runtime::Handle;

use crate::metrics::Metrics;
use crate::models::Settings;
use crate::models::operation::{Category, INDETERMINATE, Operation, State};
use crate::ops::{Job, Registry, spawn_tracked};
use crate::services::flatpak::FlatpakClient;
use crate::services::homebrew::BrewClient;
use crate::services::osimage::OsImageClient;
use crate::services::snap::SnapClient;
use crate::services::sysext::SysextClient;
use crate::ui::panel;

// Include the generated Slint code
slint::include_modules!();

/// All backend clients, constructed once from settings and shared with every
/// background job.
struct Services {
    flatpak: FlatpakClient,
    brew: BrewClient,
    snap: SnapClient,
    osimage: OsImageClient,
    sysext: SysextClient,
}

impl Services {
    fn new(settings: &Settings) -> Self {
        let dry_run = settings.dry_run;
        Self {
            flatpak: FlatpakClient::new(&settings.flatpak, dry_run),
            brew: BrewClient::new(&settings.homebrew, dry_run),
            snap: SnapClient::new(&settings.snap, dry_run),
            osimage: OsImageClient::new(dry_run),
            sysext: SysextClient::new(dry_run),
        }
    }
}

/// Everything the Slint callbacks need, cloneable so each callback closure
/// can own a copy.
#[derive(Clone)]
struct Ctx {
    registry: Registry,
    runtime: Handle,
    services: Arc<Services>,
    settings: Arc<Settings>,
    metrics: Arc<Metrics>,
}

impl Ctx {
    /// Start a registry-tracked job and count it.
    fn start_job(&self, name: impl Into<String>, category: Category, job: Job) {
        self.metrics.record_started();
        spawn_tracked(&self.registry, &self.runtime, name, category, job);
    }
}

/// Controller owning the main window and its wiring.
pub struct UiController {
    ui: MainWindow,
}

impl UiController {
    /// Build the window, register callbacks and the registry listener, and
    /// kick off the initial inventory load.
    pub fn new(
        registry: Registry,
        settings: Settings,
        runtime: Handle,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create main window")?;

        let ctx = Ctx {
            registry,
            runtime,
            services: Arc::new(Services::new(&settings)),
            settings: Arc::new(settings),
            metrics,
        };

        setup_callbacks(&ui, &ctx);
        setup_registry_listener(&ui, &ctx);
        refresh_panel(&ui, &ctx.registry);
        spawn_inventory_load(&ctx);

        tracing::info!("UI controller initialized");
        Ok(Self { ui })
    }

    /// Run the GUI. Blocks until the window is closed.
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("starting event loop");
        self.ui.run()
    }
}

/// Subscribe to registry changes. The listener runs on the event-loop thread
/// (delivery goes through the dispatcher), so it may touch the window
/// directly after upgrading the weak handle.
fn setup_registry_listener(ui: &MainWindow, ctx: &Ctx) {
    // The weak handle is Send but not Sync; the Mutex only exists to let the
    // listener closure be shared across threads. It is locked exclusively on
    // the event-loop thread.
    let weak = Arc::new(std::sync::Mutex::new(ui.as_weak()));
    let ctx_for_listener = ctx.clone();
    ctx.registry.add_listener(move |op| {
        match op.state {
            State::Completed => ctx_for_listener.metrics.record_completed(),
            State::Failed => ctx_for_listener.metrics.record_failed(),
            State::Cancelled => ctx_for_listener.metrics.record_cancelled(),
            State::Active => {}
        }
        ctx_for_listener.metrics.record_panel_refresh();

        let weak = weak.lock().unwrap().clone();
        let Some(ui) = weak.upgrade() else {
            return;
        };
        update_status_line(&ui, op);
        refresh_panel(&ui, &ctx_for_listener.registry);
    });
}

/// Rebuild badge, active rows, and history rows from the registry.
fn refresh_panel(ui: &MainWindow, registry: &Registry) {
    ui.set_active_count(registry.active_count() as i32);

    let mut rows: Vec<OpRow> = Vec::new();
    for group in panel::group_active(registry.active()) {
        for op in &group.ops {
            rows.push(op_row(op));
        }
    }
    ui.set_active_ops(ModelRc::new(VecModel::from(rows)));

    let history: Vec<HistoryRow> = panel::sort_history(registry.history())
        .iter()
        .map(history_row)
        .collect();
    ui.set_history_ops(ModelRc::new(VecModel::from(history)));
}

fn op_row(op: &Operation) -> OpRow {
    OpRow {
        id: op.id as i32,
        name: op.name.clone().into(),
        category: op.category.title().into(),
        message: panel::active_subtitle(op).into(),
        progress: op.progress.clamp(0.0, 1.0),
        indeterminate: op.progress < 0.0,
        failed: op.state == State::Failed,
        cancellable: op.is_cancellable(),
        retryable: op.state == State::Failed && op.retry.is_some(),
    }
}

fn history_row(op: &Operation) -> HistoryRow {
    HistoryRow {
        name: op.name.clone().into(),
        outcome: op.state.label().into(),
        detail: panel::history_subtitle(op).into(),
    }
}

/// Keep the status line tracking the latest notable outcome.
fn update_status_line(ui: &MainWindow, op: &Operation) {
    match op.state {
        State::Failed => {
            let error = op.error_text().unwrap_or_default();
            ui.set_status_message(format!("Couldn't complete {}: {error}", op.name).into());
        }
        State::Completed if op.category == Category::Loading && !op.message.is_empty() => {
            // Inventory and update checks leave their summary in the final
            // status message.
            ui.set_status_message(op.message.clone().into());
        }
        _ => {}
    }
}

fn setup_callbacks(ui: &MainWindow, ctx: &Ctx) {
    {
        let ctx = ctx.clone();
        ui.on_install_flatpak(move |app_id| {
            let app_id = app_id.trim().to_string();
            if app_id.is_empty() {
                return;
            }
            let job: Job = {
                let flatpak = ctx.services.flatpak.clone();
                let app_id = app_id.clone();
                Arc::new(move |op, token| {
                    let flatpak = flatpak.clone();
                    let app_id = app_id.clone();
                    Box::pin(async move {
                        op.update_progress(INDETERMINATE, "Contacting remote");
                        flatpak.install(&app_id, true, &token).await?;
                        Ok(())
                    })
                })
            };
            ctx.start_job(format!("Install {app_id}"), Category::Install, job);
        });
    }

    {
        let ctx = ctx.clone();
        ui.on_install_brew(move |name| {
            let name = name.trim().to_string();
            if name.is_empty() {
                return;
            }
            let job: Job = {
                let brew = ctx.services.brew.clone();
                let name = name.clone();
                Arc::new(move |op, token| {
                    let brew = brew.clone();
                    let name = name.clone();
                    Box::pin(async move {
                        op.update_progress(INDETERMINATE, "Resolving formula");
                        brew.install(&name, false, &token).await?;
                        Ok(())
                    })
                })
            };
            ctx.start_job(format!("Install {name}"), Category::Install, job);
        });
    }

    {
        let ctx = ctx.clone();
        ui.on_check_updates(move || {
            let job: Job = {
                let services = ctx.services.clone();
                Arc::new(move |op, _token| {
                    let services = services.clone();
                    Box::pin(async move {
                        op.update_progress(0.1, "Checking Flatpak updates");
                        let flatpaks = count_or_zero(services.flatpak.list_updates(true).await)
                            + count_or_zero(services.flatpak.list_updates(false).await);

                        op.update_progress(0.4, "Checking Homebrew updates");
                        let brews = count_or_zero(services.brew.outdated().await);

                        op.update_progress(0.7, "Checking OS image");
                        let os = match services.osimage.check_update().await {
                            Ok(check) if check.update_available => {
                                format!("; OS image {} available", check.latest_version)
                            }
                            Ok(_) => "; OS image up to date".to_string(),
                            Err(err) => {
                                tracing::warn!(error = %err, "OS image check failed");
                                String::new()
                            }
                        };

                        op.update_progress(
                            1.0,
                            &format!("{flatpaks} Flatpak and {brews} Homebrew updates{os}"),
                        );
                        Ok(())
                    })
                })
            };
            ctx.start_job("Check for updates", Category::Loading, job);
        });
    }

    {
        let ctx = ctx.clone();
        let channel = ctx.settings.update_channel.clone();
        ui.on_update_os_image(move || {
            let job: Job = {
                let osimage = ctx.services.osimage.clone();
                Arc::new(move |op, token| {
                    let osimage = osimage.clone();
                    Box::pin(async move {
                        let progress_op = op.clone();
                        osimage
                            .apply_update(&token, move |fraction, message| {
                                progress_op.update_progress(fraction, message);
                            })
                            .await?;
                        Ok(())
                    })
                })
            };
            ctx.start_job(
                format!("Update OS image ({channel})"),
                Category::Update,
                job,
            );
        });
    }

    {
        let ctx = ctx.clone();
        ui.on_refresh_extensions(move || {
            let job: Job = {
                let sysext = ctx.services.sysext.clone();
                Arc::new(move |op, token| {
                    let sysext = sysext.clone();
                    Box::pin(async move {
                        op.update_progress(INDETERMINATE, "Re-merging extensions");
                        sysext.refresh(&token).await?;
                        let installed = sysext.installed().await?;
                        op.update_progress(1.0, &format!("{} extensions active", installed.len()));
                        Ok(())
                    })
                })
            };
            ctx.start_job("Refresh extensions", Category::Maintenance, job);
        });
    }

    {
        let ctx = ctx.clone();
        ui.on_install_bundle(move || {
            let Some((name, path)) = ctx.settings.bundles.first().map(|(n, p)| (n.clone(), p.clone()))
            else {
                tracing::warn!("no bundles configured");
                return;
            };
            let job: Job = {
                let brew = ctx.services.brew.clone();
                Arc::new(move |op, token| {
                    let brew = brew.clone();
                    let path = Utf8PathBuf::from(path.clone());
                    Box::pin(async move {
                        op.update_progress(INDETERMINATE, "Installing bundle packages");
                        brew.bundle_install(&path, &token).await?;
                        Ok(())
                    })
                })
            };
            ctx.start_job(format!("Install {name} bundle"), Category::Install, job);
        });
    }

    {
        let ctx = ctx.clone();
        ui.on_export_brewfile(move || {
            // Native save dialog; must run on the event-loop thread, which
            // Slint callbacks do.
            let Some(path) = rfd::FileDialog::new()
                .set_file_name("Brewfile")
                .save_file()
            else {
                return;
            };
            let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
                tracing::warn!("selected path is not valid UTF-8");
                return;
            };
            let job: Job = {
                let brew = ctx.services.brew.clone();
                Arc::new(move |op, token| {
                    let brew = brew.clone();
                    let path = path.clone();
                    Box::pin(async move {
                        op.update_progress(INDETERMINATE, "Writing Brewfile");
                        brew.bundle_dump(&path, true, &token).await?;
                        Ok(())
                    })
                })
            };
            ctx.start_job("Export Brewfile", Category::Maintenance, job);
        });
    }

    {
        let ctx = ctx.clone();
        let weak = ui.as_weak();
        ui.on_request_cancel(move |id, name| {
            let Some(ui) = weak.upgrade() else {
                return;
            };
            if ctx.settings.confirm_cancellation {
                ui.set_confirm_id(id);
                ui.set_confirm_name(name);
                ui.set_confirm_visible(true);
            } else {
                ctx.registry.cancel(id as u64);
            }
        });
    }

    {
        let ctx = ctx.clone();
        let weak = ui.as_weak();
        ui.on_confirm_cancel(move || {
            let Some(ui) = weak.upgrade() else {
                return;
            };
            let id = ui.get_confirm_id();
            ui.set_confirm_visible(false);
            ctx.registry.cancel(id as u64);
            ui.set_status_message(format!("Cancelled \"{}\"", ui.get_confirm_name()).into());
        });
    }

    {
        let weak = ui.as_weak();
        ui.on_dismiss_cancel(move || {
            if let Some(ui) = weak.upgrade() {
                ui.set_confirm_visible(false);
            }
        });
    }

    {
        let ctx = ctx.clone();
        ui.on_retry_operation(move |id| {
            // The retry hook starts a brand-new operation; the failed record
            // stays behind until retention drops it.
            if let Some(op) = ctx.registry.get(id as u64) {
                if let Some(retry) = op.retry {
                    retry();
                }
            }
        });
    }
}

/// Load the installed-software inventory once at startup so the status line
/// has something to say before the user clicks anything.
fn spawn_inventory_load(ctx: &Ctx) {
    let job: Job = {
        let services = ctx.services.clone();
        Arc::new(move |op, _token| {
            let services = services.clone();
            Box::pin(async move {
                op.update_progress(0.2, "Listing Flatpak applications");
                let flatpaks = count_or_zero(services.flatpak.list_apps(true).await)
                    + count_or_zero(services.flatpak.list_apps(false).await);

                op.update_progress(0.5, "Listing Homebrew packages");
                let brews = if services.brew.available().await {
                    count_or_zero(services.brew.installed().await)
                } else {
                    0
                };

                op.update_progress(0.7, "Listing snaps");
                let snaps = if services.snap.available().await {
                    count_or_zero(services.snap.installed().await)
                } else {
                    0
                };

                op.update_progress(0.9, "Listing extensions");
                let extensions = if services.sysext.available().await {
                    count_or_zero(services.sysext.installed().await)
                } else {
                    0
                };

                op.update_progress(
                    1.0,
                    &format!(
                        "{flatpaks} Flatpaks, {brews} Homebrew packages, {snaps} snaps, {extensions} extensions"
                    ),
                );
                Ok(())
            })
        })
    };
    ctx.start_job("Load installed software", Category::Loading, job);
}

/// Collapse a listing result to a count, logging failures instead of failing
/// the whole inventory pass.
fn count_or_zero<T, E: std::fmt::Display>(result: Result<Vec<T>, E>) -> usize {
    match result {
        Ok(items) => items.len(),
        Err(err) => {
            tracing::warn!(error = %err, "listing failed");
            0
        }
    }
}
