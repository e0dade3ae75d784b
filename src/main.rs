//! Basecamp - desktop companion for managing immutable Linux systems
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! Basecamp lets non-technical users manage an image-based Linux system
//! without a terminal: Flatpak/Homebrew/Snap package installs, OS image
//! updates via `nbc`, and systemd-sysext extensions via `updex`.
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: runs the Slint event loop (blocking, synchronous)
//! - **Tokio workers**: execute the external tools (flatpak, brew, nbc, ...)
//! - **Dispatcher**: marshals results from workers back onto the event loop
//!
//! # Execution flow
//!
//! 1. Initialize logging (rotating file under the config dir + console)
//! 2. Create the tokio runtime (4 worker threads)
//! 3. Load settings from `basecamp.yaml`
//! 4. Build the dispatcher (Slint-backed) and the operation registry
//! 5. Build the UI controller and run the event loop until the window closes
//! 6. Log the session metrics summary and shut the runtime down

use std::sync::Arc;

use anyhow::Result;
use basecamp::dispatch::Dispatcher;
use basecamp::metrics::Metrics;
use basecamp::ops::Registry;
use basecamp::ui::{SlintScheduler, UiController};
use basecamp::{APP_NAME, SettingsManager, VERSION};

fn main() -> Result<()> {
    // --dry-run logs state-changing commands instead of executing them.
    let dry_run_flag = std::env::args().any(|arg| arg == "--dry-run" || arg == "-n");
    let debug_flag = std::env::args().any(|arg| arg == "--debug");

    let config_dir = SettingsManager::default_dir()?;
    let _log_guard = basecamp::logging::init(&config_dir.join("logs"), APP_NAME, debug_flag, true)?;

    tracing::info!("starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("basecamp-worker")
        .build()?;

    let settings_manager = SettingsManager::new(&config_dir)?;
    let mut settings = settings_manager.load()?;
    if dry_run_flag {
        tracing::info!("running in dry-run mode");
        settings.dry_run = true;
    }

    // All cross-thread UI work funnels through the dispatcher; the registry
    // uses it to deliver listener notifications on the event-loop thread.
    let dispatcher = Arc::new(Dispatcher::new(SlintScheduler::new));
    let registry = Registry::new(dispatcher);
    let metrics = Arc::new(Metrics::new());

    let controller = UiController::new(
        registry.clone(),
        settings,
        runtime.handle().clone(),
        metrics.clone(),
    )?;

    // Blocks until the window is closed; background jobs keep running on the
    // tokio workers in the meantime.
    let result = controller.run();

    let still_active = registry.active_count();
    if still_active > 0 {
        tracing::warn!(still_active, "window closed with operations in flight");
    }

    metrics.log_summary();
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("shutdown complete");

    result.map_err(|err| {
        tracing::error!(error = %err, "event loop error");
        anyhow::anyhow!("event loop error: {err}")
    })
}
