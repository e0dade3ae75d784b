//! Operation tracking.
//!
//! [`Registry`] is the process-wide store of async operations; [`tasks`]
//! connects it to the tokio runtime. See the module docs in
//! [`registry`] for the threading model and lifecycle rules.

pub mod registry;
pub mod tasks;

pub use registry::{Listener, MAX_FAILED, MAX_HISTORY, OperationHandle, Registry};
pub use tasks::{Job, JobFuture, spawn_tracked};
