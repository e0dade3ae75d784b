// Slint event-loop bridge
//
// Connects the toolkit-agnostic dispatcher to Slint's event loop: the
// dispatcher hands over a callback id, and the bridge arranges for that id to
// be executed on the event-loop thread via `invoke_from_event_loop`.

use crate::dispatch::{DispatchHandle, IdleSchedule};

/// [`IdleSchedule`] implementation backed by Slint's event loop.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Arc::new(Dispatcher::new(SlintScheduler::new));
/// ```
pub struct SlintScheduler {
    handle: DispatchHandle,
}

impl SlintScheduler {
    pub fn new(handle: DispatchHandle) -> Self {
        Self { handle }
    }
}

impl IdleSchedule for SlintScheduler {
    fn schedule(&self, callback_id: u64) {
        let handle = self.handle.clone();
        if slint::invoke_from_event_loop(move || handle.execute(callback_id)).is_err() {
            // Event loop not running (startup or shutdown); the callback is
            // dropped, matching the dispatcher's delivery contract.
            tracing::warn!(callback_id, "event loop not running, dropping callback");
            self.handle.discard(callback_id);
        }
    }
}
