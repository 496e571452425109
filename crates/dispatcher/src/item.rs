//! WorkItem - the unit submitted to a dispatcher

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{Handler, HandlerRef, HandlerResult};

/// Bound for payloads carried by a dispatcher.
///
/// Payloads cross to a worker thread and are rendered with `Debug` when a
/// handler fault is logged.
pub trait Payload: Send + fmt::Debug + 'static {}

impl<T: Send + fmt::Debug + 'static> Payload for T {}

/// A keyed payload plus the handler that will process it.
///
/// Shard index and timing checkpoints are stamped by the engine; callers
/// can read them but never set them.
pub struct WorkItem<P> {
    pub(crate) key: String,
    pub(crate) payload: P,
    pub(crate) handler: HandlerRef<P>,
    pub(crate) shard_index: Option<usize>,
    pub(crate) enqueued_at: Option<Instant>,
    pub(crate) dequeued_at: Option<Instant>,
    pub(crate) completed_at: Option<Instant>,
}

impl<P> WorkItem<P> {
    /// Create a work item with a shared handler
    pub fn new(key: impl Into<String>, payload: P, handler: HandlerRef<P>) -> Self {
        Self {
            key: key.into(),
            payload,
            handler,
            shard_index: None,
            enqueued_at: None,
            dequeued_at: None,
            completed_at: None,
        }
    }

    /// Create a work item from a closure
    pub fn from_fn<F>(key: impl Into<String>, payload: P, handler: F) -> Self
    where
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new(key, payload, Arc::new(handler))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn handler_name(&self) -> &str {
        self.handler.name()
    }

    /// Shard assigned at submission (None before submit)
    pub fn shard_index(&self) -> Option<usize> {
        self.shard_index
    }

    pub fn enqueued_at(&self) -> Option<Instant> {
        self.enqueued_at
    }

    pub fn dequeued_at(&self) -> Option<Instant> {
        self.dequeued_at
    }

    pub fn completed_at(&self) -> Option<Instant> {
        self.completed_at
    }

    pub(crate) fn mark_enqueued(&mut self, shard_index: usize) {
        debug_assert!(self.shard_index.is_none(), "work item submitted twice");
        self.shard_index = Some(shard_index);
        self.enqueued_at = Some(Instant::now());
    }

    pub(crate) fn mark_dequeued(&mut self) {
        self.dequeued_at = Some(Instant::now());
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed_at = Some(Instant::now());
    }

    pub(crate) fn invoke(&self) -> HandlerResult {
        self.handler.handle(&self.payload)
    }

    /// Time spent queued, up to dequeue (or now if still queued)
    pub fn wait(&self) -> Duration {
        match (self.enqueued_at, self.dequeued_at) {
            (Some(enqueued), Some(dequeued)) => dequeued.saturating_duration_since(enqueued),
            (Some(enqueued), None) => enqueued.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Handler execution time
    pub fn exec(&self) -> Duration {
        match (self.dequeued_at, self.completed_at) {
            (Some(dequeued), Some(completed)) => completed.saturating_duration_since(dequeued),
            _ => Duration::ZERO,
        }
    }

    /// End-to-end time from enqueue to completion
    pub fn total(&self) -> Duration {
        match (self.enqueued_at, self.completed_at) {
            (Some(enqueued), Some(completed)) => completed.saturating_duration_since(enqueued),
            _ => Duration::ZERO,
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for WorkItem<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("key", &self.key)
            .field("payload", &self.payload)
            .field("handler", &self.handler.name())
            .field("shard_index", &self.shard_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::named;

    #[test]
    fn test_new_item_has_no_checkpoints() {
        let item = WorkItem::new("k", 7u32, named("noop", |_: &u32| Ok(())));
        assert_eq!(item.key(), "k");
        assert_eq!(*item.payload(), 7);
        assert_eq!(item.handler_name(), "noop");
        assert_eq!(item.shard_index(), None);
        assert!(item.enqueued_at().is_none());
        assert_eq!(item.total(), Duration::ZERO);
    }

    #[test]
    fn test_checkpoints_are_ordered() {
        let mut item = WorkItem::from_fn("k", (), |_: &()| Ok(()));
        item.mark_enqueued(3);
        item.mark_dequeued();
        assert!(item.invoke().is_ok());
        item.mark_completed();

        assert_eq!(item.shard_index(), Some(3));
        let enqueued = item.enqueued_at().unwrap();
        let dequeued = item.dequeued_at().unwrap();
        let completed = item.completed_at().unwrap();
        assert!(enqueued <= dequeued && dequeued <= completed);
        assert_eq!(item.total(), item.wait() + item.exec());
    }
}
