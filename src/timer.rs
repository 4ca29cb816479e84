//! One-shot scheduled tasks
//!
//! Thin wrapper over a spawned sleep-then-run task. The handle can cancel a
//! task that has not fired yet; under `tokio::time::pause` the delay is
//! driven deterministically, so tests can simulate elapsed time.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle to a task scheduled to run once after a delay.
///
/// Dropping the handle detaches the task; it still fires. Call
/// [`cancel`](OneShot::cancel) to prevent it from running.
#[derive(Debug)]
pub struct OneShot {
    handle: JoinHandle<()>,
}

impl OneShot {
    /// Run `task` once after `delay`
    pub fn schedule<F>(delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Self { handle }
    }

    /// Cancel the task if it has not fired yet
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task has already run (or was cancelled)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to fire or be cancelled
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
