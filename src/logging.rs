use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with a daily-rotating file appender and an optional
/// console layer.
///
/// File logs carry thread ids and source locations for debugging the
/// dispatcher/registry interplay; console output stays terse.
///
/// # Arguments
/// * `log_dir` - Directory for log files (e.g. "logs")
/// * `log_prefix` - Prefix for log files (e.g. "basecamp")
/// * `debug_mode` - If true, default to debug level; otherwise info
/// * `console` - If true, also log to stderr with ANSI colors
///
/// # Returns
/// A guard that must stay alive for the duration of the program to keep the
/// non-blocking writer flushing.
pub fn init(
    log_dir: &Utf8Path,
    log_prefix: &str,
    debug_mode: bool,
    console: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {log_dir}"))?;
    }

    let file_appender = rolling::daily(log_dir, log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins; the debug flag only sets the fallback level.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug_mode { "debug" } else { "info" }));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if console {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }

    tracing::info!(%log_dir, log_prefix, debug_mode, console, "logging initialized");

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_log_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();

        // A second init in the same process fails to set the global
        // subscriber; the directory must exist either way.
        let _ = init(&log_dir, "test", false, false);

        assert!(log_dir.exists());
    }
}
