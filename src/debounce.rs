//! Cancellable delayed work on the tokio runtime.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Owns a spawned task; aborts it when dropped.
#[derive(Debug)]
pub struct TaskHandle(AbortHandle);

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    pub fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `work` after `delay` unless the returned handle is dropped first.
pub fn spawn_after<F>(delay: Duration, work: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        work.await;
    });
    TaskHandle(task.abort_handle())
}

/// Trailing-edge debounce: each `schedule` replaces the pending call, so
/// only the last one in a burst runs, `delay` after it was scheduled.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<TaskHandle>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending = Some(spawn_after(self.delay, work));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}
