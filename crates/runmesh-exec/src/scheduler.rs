//! Bounded pool for per-system collection tasks.
//!
//! Tasks are spawned immediately and wait for one of `workers` permits, so a
//! burst of completion signals never blocks the action that fired them.
//! `drain` closes the tracker and waits, up to the drain timeout, for what
//! is already in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use runmesh_core::config::NodeConfig;

#[derive(Clone)]
pub struct CollectionPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    drain_timeout: Duration,
}

impl CollectionPool {
    pub fn new(workers: usize, drain_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            tracker: TaskTracker::new(),
            drain_timeout,
        }
    }

    pub fn from_config(cfg: &NodeConfig) -> Self {
        Self::new(
            cfg.collector_threads,
            Duration::from_millis(cfg.close_timeout_ms),
        )
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            // never closed
            let _permit = permits.acquire_owned().await.ok();
            task.await;
        });
    }

    /// Tasks spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for in-flight tasks. Returns `false` if the timeout hit first;
    /// the stragglers keep running detached.
    pub async fn drain(&self) -> bool {
        self.tracker.close();
        tokio::time::timeout(self.drain_timeout, self.tracker.wait())
            .await
            .is_ok()
    }
}
