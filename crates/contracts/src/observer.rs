//! ExecutionObserver trait - instrumentation seam of the dispatcher
//!
//! The engine reports every finished or discarded item here and nowhere
//! else. Logging and metrics backends plug in by implementing the trait.

use std::time::Duration;

use crate::HandlerResult;

/// Per-item execution report
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Owning dispatcher name
    pub dispatcher: String,
    /// Routing key of the item
    pub key: String,
    /// Shard that executed the item
    pub shard_index: usize,
    /// Handler name
    pub handler: String,
    /// Time spent queued (`dequeued - enqueued`)
    pub wait: Duration,
    /// Handler execution time (`completed - dequeued`)
    pub exec: Duration,
    /// End-to-end time (`completed - enqueued`)
    pub total: Duration,
    /// Handler outcome
    pub outcome: HandlerResult,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Outcome label: `ok`, `failed`, `panicked` or `timed_out`
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            Ok(()) => "ok",
            Err(e) => e.kind(),
        }
    }
}

/// Why a queued item was never executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Immediate-stop shutdown dropped the queued item
    Shutdown,
    /// The dispatcher was stopped before any worker was started
    NeverStarted,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::NeverStarted => "never_started",
        }
    }
}

/// Report for an item accepted by `submit` but never executed
#[derive(Debug, Clone)]
pub struct DiscardReport {
    pub dispatcher: String,
    pub key: String,
    pub shard_index: usize,
    pub handler: String,
    /// Time the item spent queued before being discarded
    pub wait: Duration,
    pub reason: DiscardReason,
}

/// Receives instrumentation from shard workers.
///
/// Called on worker threads; implementations must be cheap and must not
/// block, or they stall the shard that reports to them.
pub trait ExecutionObserver: Send + Sync {
    /// Called once per executed item
    fn on_complete(&self, report: &ExecutionReport);

    /// Called once per discarded item
    fn on_discard(&self, _report: &DiscardReport) {}
}
