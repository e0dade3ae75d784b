// Operation model
//
// An Operation is a snapshot of one tracked unit of async work: installing a
// package, applying an OS image update, refreshing a list. Snapshots are plain
// values; all mutation goes through the registry that owns the live entry.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sentinel progress value meaning "indeterminate" (no known fraction).
pub const INDETERMINATE: f32 = -1.0;

/// How long an operation must have been running before the UI offers to
/// cancel it. Very short operations would flash a useless cancel button.
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Retry hook attached to a failed operation. Invoking it starts a fresh
/// operation; the failed one is never resurrected.
pub type RetryFn = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// The operation is in progress.
    Active,
    /// The operation finished successfully.
    Completed,
    /// The operation finished with an error. Failed operations stay visible
    /// so the user can read the error and retry.
    Failed,
    /// The operation was cancelled by the user.
    Cancelled,
}

impl State {
    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What kind of work an operation performs. Used only for grouping and
/// display in the operations panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Package installation (Flatpak, Homebrew, Snap).
    Install,
    /// System or package updates.
    Update,
    /// Data loading (list refreshes, availability probes).
    Loading,
    /// Cleanup and maintenance tasks.
    Maintenance,
}

impl Category {
    /// Section title used by the operations panel.
    pub fn title(self) -> &'static str {
        match self {
            Self::Install => "Installing",
            Self::Update => "Updating",
            Self::Loading => "Loading",
            Self::Maintenance => "Maintenance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Snapshot of a tracked async operation.
///
/// Everything handed out by the registry is a value copy; mutating a snapshot
/// has no effect on the registry's own record.
#[derive(Clone)]
pub struct Operation {
    /// Unique identifier, assigned at creation and never reused.
    pub id: u64,
    /// Human-readable description, e.g. "Install Firefox".
    pub name: String,
    /// Grouping category.
    pub category: Category,
    /// Current lifecycle state.
    pub state: State,
    /// When the operation was started.
    pub started_at: Instant,
    /// When the operation reached a terminal state (`None` while active).
    pub ended_at: Option<Instant>,
    /// Completion fraction in [0.0, 1.0], or [`INDETERMINATE`].
    pub progress: f32,
    /// Current status message.
    pub message: String,
    /// Whether this operation was created with cancellation support.
    pub cancellable: bool,
    /// The error, set only when `state` is [`State::Failed`].
    pub error: Option<Arc<anyhow::Error>>,
    /// Hook the UI may invoke to re-attempt a failed operation.
    pub retry: Option<RetryFn>,
}

impl Operation {
    /// How long the operation has been running, or ran.
    pub fn duration(&self) -> Duration {
        match self.ended_at {
            Some(ended) => ended.duration_since(self.started_at),
            None => self.started_at.elapsed(),
        }
    }

    /// Whether the UI should offer cancellation right now.
    ///
    /// Requires the cancellable flag, an active state, and more than
    /// [`CANCEL_GRACE_PERIOD`] of runtime. Recomputed on every call.
    pub fn is_cancellable(&self) -> bool {
        if !self.cancellable || self.state != State::Active {
            return false;
        }
        self.duration() > CANCEL_GRACE_PERIOD
    }

    /// The error message, if the operation failed.
    pub fn error_text(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

// Manual impl: the retry hook has no useful Debug representation.
impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("message", &self.message)
            .field("cancellable", &self.cancellable)
            .field("error", &self.error_text())
            .field("has_retry", &self.retry.is_some())
            .finish()
    }
}
