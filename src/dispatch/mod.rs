// Main-thread dispatch
//
// GUI toolkits forbid touching widgets from worker threads, so every result
// computed on the tokio pool has to be marshaled onto the event-loop thread.
// The Dispatcher is that marshal: any thread hands it a closure, and the
// closure runs exactly once on the event-loop thread at the next idle slice.
//
// The event loop itself is abstracted behind [`IdleSchedule`], which only ever
// sees an integer callback id. Closures wait in a mutex-protected table keyed
// by that id until the event loop calls back; execution pops the closure under
// the lock and invokes it after the lock is released, so a callback may itself
// call `run_on_main` (or trigger registry notifications) without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// The native idle-scheduling primitive of the event loop.
///
/// Implementations must arrange for [`DispatchHandle::execute`] to be called
/// with `callback_id` exactly once, on the event-loop thread, at the next idle
/// opportunity. If the event loop is no longer running, the id may be
/// discarded; the associated callback is then never invoked.
pub trait IdleSchedule: Send + Sync {
    fn schedule(&self, callback_id: u64);
}

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CallbackTable {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Callback>>,
}

/// Executes pending callbacks by id. Held by [`IdleSchedule`] implementations;
/// holds only a weak reference so a scheduler outliving its dispatcher does
/// not keep the callback table alive.
#[derive(Clone)]
pub struct DispatchHandle {
    table: Weak<CallbackTable>,
}

impl DispatchHandle {
    /// Pop the callback registered under `callback_id` and invoke it.
    ///
    /// Must be called on the event-loop thread. Unknown ids are ignored, which
    /// makes spurious or duplicate wakeups harmless.
    pub fn execute(&self, callback_id: u64) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        // Pop under the lock, invoke outside it: the callback may re-enter
        // run_on_main.
        let callback = table.pending.lock().unwrap().remove(&callback_id);
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Drop the callback registered under `callback_id` without invoking it.
    ///
    /// Used by schedulers when the event loop has already shut down.
    pub fn discard(&self, callback_id: u64) {
        if let Some(table) = self.table.upgrade() {
            table.pending.lock().unwrap().remove(&callback_id);
        }
    }
}

/// Schedules closures for execution on the GUI event-loop thread.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Arc::new(Dispatcher::new(SlintScheduler::new));
///
/// tokio_handle.spawn(async move {
///     let result = fetch_data().await;
///     dispatcher.run_on_main(move || show_result(result));
/// });
/// ```
pub struct Dispatcher {
    table: Arc<CallbackTable>,
    scheduler: Box<dyn IdleSchedule>,
}

impl Dispatcher {
    /// Create a dispatcher backed by the scheduler that `make_scheduler`
    /// produces. The factory receives the [`DispatchHandle`] the scheduler
    /// needs to execute callbacks from the event-loop side.
    pub fn new<S, F>(make_scheduler: F) -> Self
    where
        S: IdleSchedule + 'static,
        F: FnOnce(DispatchHandle) -> S,
    {
        let table = Arc::new(CallbackTable::default());
        let handle = DispatchHandle {
            table: Arc::downgrade(&table),
        };
        Self {
            table,
            scheduler: Box::new(make_scheduler(handle)),
        }
    }

    /// Schedule `f` to run on the event-loop thread at the next idle slice.
    ///
    /// Callable from any thread, including the event-loop thread itself; the
    /// closure is never invoked inline. Calls from one thread are delivered in
    /// submission order. If the event loop is not running the closure is
    /// silently dropped.
    pub fn run_on_main<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.table.pending.lock().unwrap().insert(id, Box::new(f));
        self.scheduler.schedule(id);
    }

    /// Number of callbacks submitted but not yet executed.
    pub fn pending_count(&self) -> usize {
        self.table.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Scheduler that forwards callback ids over a channel to a pump thread
    /// standing in for the GUI event loop.
    struct ChannelScheduler {
        tx: mpsc::Sender<u64>,
    }

    impl IdleSchedule for ChannelScheduler {
        fn schedule(&self, callback_id: u64) {
            // A closed channel means the loop is gone; the callback is dropped.
            let _ = self.tx.send(callback_id);
        }
    }

    fn pump_dispatcher() -> (Arc<Dispatcher>, thread::JoinHandle<()>, mpsc::Sender<u64>) {
        let (tx, rx) = mpsc::channel::<u64>();
        let (handle_tx, handle_rx) = mpsc::channel();
        let sched_tx = tx.clone();
        let dispatcher = Arc::new(Dispatcher::new(move |handle| {
            handle_tx.send(handle).unwrap();
            ChannelScheduler { tx: sched_tx }
        }));
        let handle: DispatchHandle = handle_rx.recv().unwrap();
        let pump = thread::spawn(move || {
            while let Ok(id) = rx.recv() {
                if id == 0 {
                    break;
                }
                handle.execute(id);
            }
        });
        (dispatcher, pump, tx)
    }

    #[test]
    fn test_callback_runs_once_on_pump_thread() {
        let (dispatcher, pump, quit_tx) = pump_dispatcher();
        let (done_tx, done_rx) = mpsc::channel();

        dispatcher.run_on_main(move || {
            done_tx.send(thread::current().id()).unwrap();
        });

        let ran_on = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("callback not delivered");
        quit_tx.send(0).unwrap();
        let pump_id = pump.thread().id();
        pump.join().unwrap();

        assert_eq!(ran_on, pump_id);
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_submission_order_preserved() {
        let (dispatcher, pump, quit_tx) = pump_dispatcher();
        let (tx, rx) = mpsc::channel();

        for i in 0..50 {
            let tx = tx.clone();
            dispatcher.run_on_main(move || {
                tx.send(i).unwrap();
            });
        }

        let received: Vec<i32> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(received, (0..50).collect::<Vec<_>>());

        quit_tx.send(0).unwrap();
        pump.join().unwrap();
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let (dispatcher, pump, quit_tx) = pump_dispatcher();
        let table_handle = DispatchHandle {
            table: Arc::downgrade(&dispatcher.table),
        };

        // Never registered; must not panic.
        table_handle.execute(9999);

        quit_tx.send(0).unwrap();
        pump.join().unwrap();
    }

    /// Scheduler modeling an event loop that already shut down: every id is
    /// discarded without execution.
    struct ShutdownScheduler {
        handle: DispatchHandle,
    }

    impl IdleSchedule for ShutdownScheduler {
        fn schedule(&self, callback_id: u64) {
            self.handle.discard(callback_id);
        }
    }

    #[test]
    fn test_discard_prevents_execution() {
        let dispatcher = Arc::new(Dispatcher::new(|handle| ShutdownScheduler { handle }));
        let (tx, rx) = mpsc::channel();
        dispatcher.run_on_main(move || {
            tx.send(()).unwrap();
        });

        // The scheduler discarded immediately; nothing may ever arrive.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(dispatcher.pending_count(), 0);
    }

    /// Scheduler that does nothing, leaving callbacks parked in the table.
    struct NullScheduler;

    impl IdleSchedule for NullScheduler {
        fn schedule(&self, _callback_id: u64) {}
    }

    #[test]
    fn test_pending_count_tracks_undelivered() {
        let dispatcher = Arc::new(Dispatcher::new(|_handle| NullScheduler));
        dispatcher.run_on_main(|| {});
        dispatcher.run_on_main(|| {});
        assert_eq!(dispatcher.pending_count(), 2);
    }
}
