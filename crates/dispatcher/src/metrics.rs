//! Shard metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::HandlerError;

/// Metrics for a single shard
#[derive(Debug, Default)]
pub struct ShardMetrics {
    /// Current queue length (approximate)
    queue_len: AtomicUsize,
    /// Items accepted by submit
    submitted_count: AtomicU64,
    /// Items whose handler returned Ok
    completed_count: AtomicU64,
    /// Items whose handler returned an error
    failure_count: AtomicU64,
    /// Items whose handler panicked
    panic_count: AtomicU64,
    /// Items whose handler overran the execution limit
    timeout_count: AtomicU64,
    /// Items accepted but never executed
    discarded_count: AtomicU64,
}

impl ShardMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn submitted_count(&self) -> u64 {
        self.submitted_count.load(Ordering::Relaxed)
    }

    pub fn inc_submitted_count(&self) {
        self.submitted_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    pub fn inc_completed_count(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn panic_count(&self) -> u64 {
        self.panic_count.load(Ordering::Relaxed)
    }

    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    /// Count a handler error under its kind
    pub fn record_handler_error(&self, error: &HandlerError) {
        let counter = match error {
            HandlerError::Failed(_) => &self.failure_count,
            HandlerError::Panicked(_) => &self.panic_count,
            HandlerError::TimedOut { .. } => &self.timeout_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded_count.load(Ordering::Relaxed)
    }

    pub fn inc_discarded_count(&self) {
        self.discarded_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self, shard_index: usize) -> ShardMetricsSnapshot {
        ShardMetricsSnapshot {
            shard_index,
            queue_len: self.queue_len(),
            submitted_count: self.submitted_count(),
            completed_count: self.completed_count(),
            failure_count: self.failure_count(),
            panic_count: self.panic_count(),
            timeout_count: self.timeout_count(),
            discarded_count: self.discarded_count(),
        }
    }
}

/// Snapshot of shard metrics (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardMetricsSnapshot {
    pub shard_index: usize,
    pub queue_len: usize,
    pub submitted_count: u64,
    pub completed_count: u64,
    pub failure_count: u64,
    pub panic_count: u64,
    pub timeout_count: u64,
    pub discarded_count: u64,
}

impl ShardMetricsSnapshot {
    /// Items that reached a handler, whatever the outcome
    pub fn executed_count(&self) -> u64 {
        self.completed_count + self.failure_count + self.panic_count + self.timeout_count
    }
}
