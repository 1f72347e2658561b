//! Task spawning abstraction.
//!
//! Services spawn their background loops (topology monitor, renewal timers,
//! volume flushes, event forwarding) through a [`TaskSpawner`] instead of
//! calling `tokio::spawn` directly, so the embedding application decides
//! which runtime they land on.

use std::future::Future;

use tokio::task::AbortHandle;

/// Where detached background work goes.
pub trait TaskSpawner: Send + Sync {
    /// Fire and forget; the task outlives the caller.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Spawns onto a fixed Tokio runtime handle.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a spawner bound to the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Spawns a task that the caller may cancel later, such as a
    /// subscription's renewal timer.
    pub fn spawn_abortable<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future).abort_handle()
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn spawned_task_runs_on_the_bound_runtime() {
        let spawner = TokioSpawner::new(tokio::runtime::Handle::current());
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawner.spawn(async move {
            let _ = tx.send(7u8);
        });
        assert_eq!(rx.await.expect("task ran"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_task_never_runs() {
        let spawner = TokioSpawner::current();
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        let handle = spawner.spawn_abortable(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            executed_clone.store(true, Ordering::SeqCst);
        });
        handle.abort();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!executed.load(Ordering::SeqCst));
    }
}
