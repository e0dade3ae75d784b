// Operation registry
//
// The registry is the single source of truth for in-flight and recently
// finished operations. Any UI surface (the operations panel, the header
// badge) reads it instead of keeping its own progress state, and subscribes
// to change notifications instead of polling.
//
// # Threading model
//
// The registry is thread-safe; a single RwLock guards the active table, the
// history list, and the listener list. Listener callbacks still have to run
// on the GUI thread, so every mutation follows the same two-phase pattern:
//
// 1. take the lock, apply the change, copy the affected operation and the
//    listener list, release the lock
// 2. outside the lock, hand the copy to each listener via the dispatcher
//
// A listener is therefore never invoked while the registry is locked, and may
// freely call back into the registry.
//
// # Lifecycle
//
//     Active -> Completed   (success; moved to history)
//     Active -> Failed      (error; stays in the active table for retry)
//     Active -> Cancelled   (user cancel; moved to history)
//
// Terminal transitions are idempotent: completing or cancelling an operation
// that already left Active is a no-op.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::models::operation::{Category, INDETERMINATE, Operation, RetryFn, State};

/// Maximum number of finished operations kept in history.
pub const MAX_HISTORY: usize = 100;

/// Maximum number of failed operations kept in the active table. Failures are
/// retained for retry, but a user who never retries must not accumulate them
/// forever; beyond this cap the oldest failure is dropped.
pub const MAX_FAILED: usize = 20;

/// Callback invoked (on the GUI thread) with a copy of each changed operation.
pub type Listener = Arc<dyn Fn(&Operation) + Send + Sync>;

/// Cancellation hook, consumed exactly once when cancellation is requested.
/// Sync because it sits under the registry's RwLock.
type CancelFn = Box<dyn FnOnce() + Send + Sync>;

struct Entry {
    op: Operation,
    cancel: Option<CancelFn>,
}

#[derive(Default)]
struct Inner {
    active: HashMap<u64, Entry>,
    history: VecDeque<Operation>,
    listeners: Vec<Listener>,
}

struct Shared {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
    dispatcher: Arc<Dispatcher>,
}

/// Tracks all active and completed operations and fans out change
/// notifications through the dispatcher.
///
/// `Registry` is a cheap handle; clones share the same store. Construct one
/// at startup and pass it to every component that starts or displays
/// operations.
///
/// # Example
///
/// ```ignore
/// let registry = Registry::new(dispatcher);
///
/// let op = registry.start("Install Firefox", Category::Install, false);
/// tokio_handle.spawn(async move {
///     op.complete(do_install().await);
/// });
/// ```
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    /// Create an empty registry that notifies listeners via `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner::default()),
                next_id: AtomicU64::new(0),
                dispatcher,
            }),
        }
    }

    /// Register a new operation. It begins Active with indeterminate
    /// progress; listeners are notified.
    pub fn start(
        &self,
        name: impl Into<String>,
        category: Category,
        cancellable: bool,
    ) -> OperationHandle {
        self.start_internal(name.into(), category, cancellable, None)
    }

    /// Register a cancellable operation backed by a [`CancellationToken`].
    ///
    /// The returned token is a child of `parent`; the operation's cancel hook
    /// cancels it. Background work passes the token into whatever needs to
    /// observe cancellation cooperatively.
    pub fn start_with_token(
        &self,
        parent: &CancellationToken,
        name: impl Into<String>,
        category: Category,
    ) -> (OperationHandle, CancellationToken) {
        let token = parent.child_token();
        let hook: CancelFn = {
            let token = token.clone();
            Box::new(move || token.cancel())
        };
        let handle = self.start_internal(name.into(), category, true, Some(hook));
        (handle, token)
    }

    fn start_internal(
        &self,
        name: String,
        category: Category,
        cancellable: bool,
        cancel: Option<CancelFn>,
    ) -> OperationHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let op = Operation {
            id,
            name,
            category,
            state: State::Active,
            started_at: Instant::now(),
            ended_at: None,
            progress: INDETERMINATE,
            message: String::new(),
            cancellable,
            error: None,
            retry: None,
        };
        tracing::debug!(id, name = %op.name, ?category, "operation started");

        let (snapshot, listeners) = {
            let mut inner = self.shared.inner.write().unwrap();
            let snapshot = op.clone();
            inner.active.insert(id, Entry { op, cancel });
            (snapshot, inner.listeners.clone())
        };

        self.notify(snapshot, listeners);
        OperationHandle {
            id,
            registry: self.clone(),
        }
    }

    /// Look up an operation by id. Returns a copy, or `None` if the id is not
    /// in the active table (completed and cancelled operations are only
    /// reachable through [`history`](Self::history)).
    pub fn get(&self, id: u64) -> Option<Operation> {
        let inner = self.shared.inner.read().unwrap();
        inner.active.get(&id).map(|entry| entry.op.clone())
    }

    /// Number of operations in the active table (including failed ones).
    pub fn active_count(&self) -> usize {
        self.shared.inner.read().unwrap().active.len()
    }

    /// Copies of all operations in the active table, unordered.
    pub fn active(&self) -> Vec<Operation> {
        let inner = self.shared.inner.read().unwrap();
        inner.active.values().map(|entry| entry.op.clone()).collect()
    }

    /// Copies of the finished operations, unordered, capped at
    /// [`MAX_HISTORY`] with the oldest evicted first.
    pub fn history(&self) -> Vec<Operation> {
        let inner = self.shared.inner.read().unwrap();
        inner.history.iter().cloned().collect()
    }

    /// Register a listener invoked once per state-changing mutation with a
    /// copy of the affected operation. Delivery always goes through the
    /// dispatcher, so listeners run on the GUI thread.
    ///
    /// There is no unregister: listeners are expected to live for the whole
    /// process (a status bar, the operations panel), not per dialog.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Operation) + Send + Sync + 'static,
    {
        let mut inner = self.shared.inner.write().unwrap();
        inner.listeners.push(Arc::new(listener));
    }

    pub(crate) fn update_progress(&self, id: u64, progress: f32, message: &str) {
        let changed = {
            let mut inner = self.shared.inner.write().unwrap();
            apply_progress(&mut inner, id, progress, message)
        };
        if let Some((snapshot, listeners)) = changed {
            self.notify(snapshot, listeners);
        }
    }

    pub(crate) fn complete(&self, id: u64, result: anyhow::Result<()>) {
        let changed = {
            let mut inner = self.shared.inner.write().unwrap();
            apply_complete(&mut inner, id, result)
        };
        if let Some((snapshot, listeners)) = changed {
            self.notify(snapshot, listeners);
        }
    }

    pub(crate) fn cancel(&self, id: u64) {
        let changed = {
            let mut inner = self.shared.inner.write().unwrap();
            apply_cancel(&mut inner, id)
        };
        let Some((snapshot, listeners, cancel)) = changed else {
            return;
        };

        tracing::debug!(id, "operation cancelled");
        // The hook runs outside the lock: it is user code and may re-enter
        // the registry. It fires before listeners hear about the transition.
        if let Some(cancel) = cancel {
            cancel();
        }
        self.notify(snapshot, listeners);
    }

    pub(crate) fn set_retry(&self, id: u64, retry: RetryFn) {
        let mut inner = self.shared.inner.write().unwrap();
        if let Some(entry) = inner.active.get_mut(&id) {
            entry.op.retry = Some(retry);
        }
    }

    fn notify(&self, op: Operation, listeners: Vec<Listener>) {
        for listener in listeners {
            let op = op.clone();
            self.shared
                .dispatcher
                .run_on_main(move || listener(&op));
        }
    }
}

type Changed = (Operation, Vec<Listener>);

fn apply_progress(inner: &mut Inner, id: u64, progress: f32, message: &str) -> Option<Changed> {
    match inner.active.get_mut(&id) {
        Some(entry) if entry.op.state == State::Active => {
            entry.op.progress = progress;
            entry.op.message = message.to_string();
            Some((entry.op.clone(), inner.listeners.clone()))
        }
        // Unknown or already-terminal operation: ignore.
        _ => None,
    }
}

fn apply_complete(inner: &mut Inner, id: u64, result: anyhow::Result<()>) -> Option<Changed> {
    let entry = inner.active.get_mut(&id)?;
    if entry.op.state != State::Active {
        return None;
    }
    entry.op.ended_at = Some(Instant::now());

    match result {
        Ok(()) => {
            entry.op.state = State::Completed;
            let entry = inner.active.remove(&id).unwrap();
            push_history(&mut inner.history, entry.op.clone());
            Some((entry.op, inner.listeners.clone()))
        }
        Err(err) => {
            tracing::debug!(id, error = %err, "operation failed");
            entry.op.state = State::Failed;
            entry.op.error = Some(Arc::new(err));
            let snapshot = entry.op.clone();
            evict_stale_failures(&mut inner.active, id);
            Some((snapshot, inner.listeners.clone()))
        }
    }
}

fn apply_cancel(inner: &mut Inner, id: u64) -> Option<(Operation, Vec<Listener>, Option<CancelFn>)> {
    match inner.active.get(&id) {
        Some(entry) if entry.op.state == State::Active => {}
        _ => return None,
    }
    let mut entry = inner.active.remove(&id).unwrap();
    entry.op.state = State::Cancelled;
    entry.op.ended_at = Some(Instant::now());
    push_history(&mut inner.history, entry.op.clone());
    Some((entry.op, inner.listeners.clone(), entry.cancel))
}

fn push_history(history: &mut VecDeque<Operation>, op: Operation) {
    history.push_back(op);
    if history.len() > MAX_HISTORY {
        history.pop_front();
    }
}

/// Drop the oldest failed operations beyond [`MAX_FAILED`], never touching
/// `keep` (the failure that just happened). Dropped failures do not enter
/// history; history holds only completed and cancelled operations.
fn evict_stale_failures(active: &mut HashMap<u64, Entry>, keep: u64) {
    let mut failed: Vec<(Instant, u64)> = active
        .iter()
        .filter(|(id, entry)| entry.op.state == State::Failed && **id != keep)
        .map(|(id, entry)| (entry.op.ended_at.unwrap_or(entry.op.started_at), *id))
        .collect();
    failed.sort_unstable();
    // +1 for the failure we are keeping.
    let excess = (failed.len() + 1).saturating_sub(MAX_FAILED);
    for (_, id) in failed.into_iter().take(excess) {
        active.remove(&id);
        tracing::debug!(id, "dropped stale failed operation");
    }
}

/// Handle to a live operation, returned by [`Registry::start`].
///
/// The handle delegates back into the registry using the operation's own id,
/// so call sites do not need to carry a separate registry reference. All
/// methods are safe from any thread; calls on an operation that already
/// reached a terminal state are silently ignored.
#[derive(Clone)]
pub struct OperationHandle {
    id: u64,
    registry: Registry,
}

impl OperationHandle {
    /// The operation's unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Update progress (fraction in [0, 1] or [`INDETERMINATE`]) and the
    /// status message. Ignored once the operation left Active.
    pub fn update_progress(&self, progress: f32, message: &str) {
        self.registry.update_progress(self.id, progress, message);
    }

    /// Mark the operation finished: `Ok` completes it into history, `Err`
    /// flags it Failed and keeps it in the active table for retry.
    pub fn complete(&self, result: anyhow::Result<()>) {
        self.registry.complete(self.id, result);
    }

    /// Cancel the operation. Invokes the cancel hook (if any), then retires
    /// the operation into history.
    pub fn cancel(&self) {
        self.registry.cancel(self.id);
    }

    /// Attach the hook a UI surface invokes to re-attempt this operation
    /// after failure.
    pub fn set_retry<F>(&self, retry: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.registry.set_retry(self.id, Arc::new(retry));
    }

    /// Current snapshot of the operation, if it is still in the active table.
    pub fn snapshot(&self) -> Option<Operation> {
        self.registry.get(self.id)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::dispatch::IdleSchedule;
    use proptest::prelude::*;

    struct NullScheduler;

    impl IdleSchedule for NullScheduler {
        fn schedule(&self, _callback_id: u64) {}
    }

    #[derive(Debug, Clone, Copy)]
    enum Action {
        Start,
        CompleteOk,
        CompleteErr,
        Cancel,
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Start),
            Just(Action::CompleteOk),
            Just(Action::CompleteErr),
            Just(Action::Cancel),
        ]
    }

    proptest! {
        /// Whatever the interleaving, the structural invariants hold: ids are
        /// unique, history never exceeds its cap, failures never exceed
        /// theirs, and history contains no Active or Failed entries.
        #[test]
        fn registry_invariants(actions in proptest::collection::vec(action_strategy(), 1..400)) {
            let registry = Registry::new(Arc::new(Dispatcher::new(|_| NullScheduler)));
            let mut handles: Vec<OperationHandle> = Vec::new();
            let mut next = 0usize;

            for action in actions {
                match action {
                    Action::Start => {
                        handles.push(registry.start("op", Category::Install, true));
                    }
                    Action::CompleteOk | Action::CompleteErr | Action::Cancel if !handles.is_empty() => {
                        let handle = &handles[next % handles.len()];
                        next += 1;
                        match action {
                            Action::CompleteOk => handle.complete(Ok(())),
                            Action::CompleteErr => handle.complete(Err(anyhow::anyhow!("x"))),
                            Action::Cancel => handle.cancel(),
                            Action::Start => unreachable!(),
                        }
                    }
                    _ => {}
                }
            }

            let active = registry.active();
            let history = registry.history();

            let mut ids: Vec<u64> = active.iter().chain(history.iter()).map(|op| op.id).collect();
            ids.sort_unstable();
            let len_before = ids.len();
            ids.dedup();
            prop_assert_eq!(ids.len(), len_before, "no id appears twice across active and history");

            prop_assert!(history.len() <= MAX_HISTORY);
            let failed = active.iter().filter(|op| op.state == State::Failed).count();
            prop_assert!(failed <= MAX_FAILED);
            prop_assert!(history.iter().all(|op| matches!(op.state, State::Completed | State::Cancelled)));
        }
    }
}
