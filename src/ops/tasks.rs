// Tracked background tasks
//
// Bridges the registry to the tokio runtime: a job is spawned as a tokio
// task, wrapped in a registry operation, and wired up so that failure leaves
// a retry hook which re-runs the same job as a brand new operation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::models::operation::Category;
use crate::ops::registry::{OperationHandle, Registry};

/// The future a [`Job`] produces.
pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A re-runnable unit of background work. The job receives the operation
/// handle (for progress updates) and a cancellation token it must observe
/// cooperatively; its result completes the operation.
pub type Job = Arc<dyn Fn(OperationHandle, CancellationToken) -> JobFuture + Send + Sync>;

/// Start `job` as a registry-tracked operation on the tokio runtime.
///
/// The operation is cancellable through the registry: cancelling it trips the
/// token handed to the job. On failure the operation keeps a retry hook that
/// calls `spawn_tracked` again with the same job, producing a fresh
/// operation; the failed one is left behind per the registry's retention
/// rules.
pub fn spawn_tracked(
    registry: &Registry,
    runtime: &Handle,
    name: impl Into<String>,
    category: Category,
    job: Job,
) -> OperationHandle {
    let name = name.into();
    let (op, token) = registry.start_with_token(&CancellationToken::new(), name.clone(), category);

    {
        let registry = registry.clone();
        let runtime = runtime.clone();
        let job = job.clone();
        op.set_retry(move || {
            tracing::info!(name = %name, "retrying operation");
            spawn_tracked(&registry, &runtime, name.clone(), category, job.clone());
        });
    }

    let handle = op.clone();
    let future = job(op.clone(), token.clone());
    runtime.spawn(async move {
        let result = future.await;
        if token.is_cancelled() {
            // The registry already transitioned to Cancelled; reporting the
            // job's outcome now would be a no-op anyway.
            return;
        }
        handle.complete(result);
    });

    op
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, IdleSchedule};
    use crate::models::operation::State;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullScheduler;

    impl IdleSchedule for NullScheduler {
        fn schedule(&self, _callback_id: u64) {}
    }

    fn test_registry() -> Registry {
        Registry::new(Arc::new(Dispatcher::new(|_| NullScheduler)))
    }

    async fn wait_until(mut probe: impl FnMut() -> bool) {
        for _ in 0..200 {
            if probe() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_successful_job_completes_into_history() {
        let registry = test_registry();
        let job: Job = Arc::new(|op, _token| {
            Box::pin(async move {
                op.update_progress(0.5, "halfway");
                Ok(())
            })
        });

        let handle = spawn_tracked(
            &registry,
            &Handle::current(),
            "Quick job",
            Category::Loading,
            job,
        );

        let registry2 = registry.clone();
        wait_until(move || registry2.active_count() == 0).await;
        let history = registry.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, handle.id());
        assert_eq!(history[0].state, State::Completed);
    }

    #[tokio::test]
    async fn test_failed_job_retries_as_new_operation() {
        let registry = test_registry();
        let attempts = Arc::new(AtomicUsize::new(0));

        let job: Job = {
            let attempts = attempts.clone();
            Arc::new(move |_op, _token| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n == 0 {
                        Err(anyhow::anyhow!("first attempt fails"))
                    } else {
                        Ok(())
                    }
                })
            })
        };

        let first = spawn_tracked(
            &registry,
            &Handle::current(),
            "Flaky job",
            Category::Install,
            job,
        );

        let registry2 = registry.clone();
        let first_id = first.id();
        wait_until(move || {
            registry2
                .get(first_id)
                .is_some_and(|op| op.state == State::Failed)
        })
        .await;

        let failed = registry.get(first.id()).unwrap();
        let retry = failed.retry.expect("failed operation carries retry hook");
        retry();

        let registry2 = registry.clone();
        wait_until(move || registry2.history().len() == 1).await;

        let history = registry.history();
        assert_eq!(history[0].state, State::Completed);
        assert_ne!(history[0].id, first.id(), "retry runs as a new operation");
        // The original failure is still visible until retention drops it.
        assert_eq!(registry.get(first.id()).unwrap().state, State::Failed);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_job_stays_cancelled() {
        let registry = test_registry();
        let job: Job = Arc::new(|_op, token| {
            Box::pin(async move {
                token.cancelled().await;
                // Work observed cancellation and unwound with an error; the
                // registry must keep the Cancelled record, not flip to Failed.
                Err(anyhow::anyhow!("interrupted"))
            })
        });

        let handle = spawn_tracked(
            &registry,
            &Handle::current(),
            "Long job",
            Category::Update,
            job,
        );

        handle.cancel();

        let registry2 = registry.clone();
        wait_until(move || registry2.history().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let history = registry.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, State::Cancelled);
        assert!(registry.get(handle.id()).is_none());
    }
}
