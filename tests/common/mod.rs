// Shared test helper: a pump thread standing in for the GUI event loop.
//
// The dispatcher only talks to the event loop through its idle-schedule
// interface, so tests substitute a channel plus a dedicated thread that
// executes callback ids in arrival order, just like a real toolkit idle
// queue would.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use basecamp::dispatch::{DispatchHandle, Dispatcher, IdleSchedule};

enum PumpMsg {
    Run(u64),
    Quit,
}

struct ChannelScheduler {
    tx: mpsc::Sender<PumpMsg>,
}

impl IdleSchedule for ChannelScheduler {
    fn schedule(&self, callback_id: u64) {
        // A closed channel means the loop is gone; the callback is dropped,
        // matching the dispatcher's delivery contract.
        let _ = self.tx.send(PumpMsg::Run(callback_id));
    }
}

/// The fake event loop. Dropping it (or calling `shutdown`) stops the pump
/// thread; callbacks scheduled afterwards are never executed.
pub struct EventPump {
    thread_id: ThreadId,
    tx: mpsc::Sender<PumpMsg>,
    join: Option<JoinHandle<()>>,
}

impl EventPump {
    /// The thread all callbacks execute on.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stop the pump and wait for it to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(PumpMsg::Quit);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a dispatcher wired to a fresh pump thread.
pub fn pump_dispatcher() -> (Arc<Dispatcher>, EventPump) {
    let (tx, rx) = mpsc::channel();
    let (handle_tx, handle_rx) = mpsc::channel();

    let sched_tx = tx.clone();
    let dispatcher = Arc::new(Dispatcher::new(move |handle| {
        handle_tx.send(handle).unwrap();
        ChannelScheduler { tx: sched_tx }
    }));
    let handle: DispatchHandle = handle_rx.recv().unwrap();

    let (tid_tx, tid_rx) = mpsc::channel();
    let join = thread::spawn(move || {
        tid_tx.send(thread::current().id()).unwrap();
        while let Ok(msg) = rx.recv() {
            match msg {
                PumpMsg::Run(id) => handle.execute(id),
                PumpMsg::Quit => break,
            }
        }
    });
    let thread_id = tid_rx.recv().unwrap();

    (
        dispatcher,
        EventPump {
            thread_id,
            tx,
            join: Some(join),
        },
    )
}
