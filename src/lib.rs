// Basecamp - desktop companion for managing immutable Linux systems
//
// This is the library crate containing the operation coordination core
// (dispatcher + registry), the external-tool wrappers, and the GUI wiring.
// The binary crate (main.rs) provides the entry point.

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod ops;
pub mod services;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::SettingsManager;
pub use dispatch::{DispatchHandle, Dispatcher, IdleSchedule};
pub use metrics::Metrics;
pub use models::{Category, Operation, Settings, State};
pub use ops::{OperationHandle, Registry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
