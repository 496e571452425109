//! DispatcherHandle - async facade over a shared Dispatcher
//!
//! `submit` blocks on a full shard, so async callers go through the blocking
//! pool instead of stalling a runtime thread.

use std::sync::Arc;

use contracts::RoutingMode;
use tokio::task;
use tracing::{error, instrument};

use crate::dispatcher::{Dispatcher, LifecycleState};
use crate::error::DispatchError;
use crate::item::{Payload, WorkItem};
use crate::metrics::ShardMetricsSnapshot;

/// Cloneable handle to a dispatcher for use from async code
pub struct DispatcherHandle<P: Payload> {
    inner: Arc<Dispatcher<P>>,
}

impl<P: Payload> Clone for DispatcherHandle<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payload> DispatcherHandle<P> {
    pub fn new(dispatcher: Dispatcher<P>) -> Self {
        Self {
            inner: Arc::new(dispatcher),
        }
    }

    /// Wrap a dispatcher and start its workers
    pub fn spawn(dispatcher: Dispatcher<P>) -> Result<Self, DispatchError> {
        dispatcher.start()?;
        Ok(Self::new(dispatcher))
    }

    /// Shared dispatcher, for blocking callers on plain threads
    pub fn dispatcher(&self) -> &Arc<Dispatcher<P>> {
        &self.inner
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    pub fn metrics(&self) -> Vec<ShardMetricsSnapshot> {
        self.inner.metrics()
    }

    /// Submit without blocking the runtime; same result as `Dispatcher::submit`
    pub async fn submit(&self, item: WorkItem<P>, mode: RoutingMode) -> bool {
        self.submit_indexed(item, mode).await.is_some()
    }

    pub async fn submit_indexed(&self, item: WorkItem<P>, mode: RoutingMode) -> Option<usize> {
        let dispatcher = Arc::clone(&self.inner);
        match task::spawn_blocking(move || dispatcher.submit_indexed(item, mode)).await {
            Ok(shard) => shard,
            Err(e) => {
                error!(dispatcher = %self.inner.name(), error = %e, "Submit task failed");
                None
            }
        }
    }

    /// Stop the dispatcher and wait for its workers off the runtime
    #[instrument(name = "dispatcher_handle_stop", skip(self), fields(dispatcher = %self.inner.name()))]
    pub async fn stop(&self) {
        let dispatcher = Arc::clone(&self.inner);
        if let Err(e) = task::spawn_blocking(move || dispatcher.stop()).await {
            error!(error = %e, "Stop task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(key: &str, counter: &Arc<AtomicUsize>) -> WorkItem<u64> {
        let counter = Arc::clone(counter);
        WorkItem::from_fn(key, 1, move |v: &u64| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_submit_and_stop_from_async() {
        let handle = DispatcherHandle::spawn(Dispatcher::new("async", 3, 2, None).unwrap()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..30 {
            let item = counting(&format!("k{i}"), &counter);
            assert!(handle.submit(item, RoutingMode::Hash).await);
        }
        handle.stop().await;

        assert_eq!(counter.load(Ordering::SeqCst), 30);
        assert_eq!(handle.state(), LifecycleState::Stopped);
        let executed: u64 = handle.metrics().iter().map(|m| m.executed_count()).sum();
        assert_eq!(executed, 30);
    }

    #[tokio::test]
    async fn test_blocked_submit_does_not_stall_runtime() {
        // Never started: the second submit waits on a full single-slot queue
        let handle = DispatcherHandle::new(Dispatcher::new("blocked", 1, 1, None).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(handle.submit(counting("a", &counter), RoutingMode::Hash).await);

        let blocked = {
            let handle = handle.clone();
            let item = counting("b", &counter);
            tokio::spawn(async move { handle.submit(item, RoutingMode::Hash).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        handle.dispatcher().start().unwrap();
        assert!(blocked.await.unwrap());
        handle.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_after_stop_rejected() {
        let handle = DispatcherHandle::spawn(Dispatcher::<u64>::new("done", 2, 1, None).unwrap()).unwrap();
        handle.stop().await;
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(!handle.submit(counting("late", &counter), RoutingMode::RoundRobin).await);
        assert_eq!(handle.submit_indexed(counting("late", &counter), RoutingMode::Hash).await, None);
    }
}
