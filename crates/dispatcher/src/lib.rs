//! # Dispatcher
//!
//! Sharded keyed dispatch engine.
//!
//! Responsibilities:
//! - Route each work item to one shard, by key hash or round-robin
//! - One bounded FIFO queue and one dedicated worker thread per shard
//! - Block producers when a shard queue is full (backpressure)
//! - Isolate handler failures and panics at the worker boundary
//! - Stop every worker on shutdown, draining or discarding queued work

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod item;
pub mod metrics;
pub mod observer;
mod queue;
pub mod router;
mod worker;

pub use contracts::{
    named, DiscardReason, DiscardReport, DispatcherConfig, ExecutionObserver, ExecutionReport,
    Handler, HandlerError, HandlerRef, HandlerResult, HashFn, RoutingMode, ShutdownPolicy,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder, LifecycleState};
pub use error::DispatchError;
pub use handle::DispatcherHandle;
pub use item::{Payload, WorkItem};
pub use metrics::{ShardMetrics, ShardMetricsSnapshot};
pub use observer::TracingObserver;
pub use router::{default_hash, Router};
