//! Dispatcher - owns the shard queues and workers
//!
//! Lifecycle: `Created -> Running -> Stopping -> Stopped`.
//!
//! Queues exist from construction, so producers may submit (and block on a
//! full shard) before `start`. Workers exist from `start` until `stop`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use contracts::{
    DiscardReason, DispatcherConfig, ExecutionObserver, HashFn, RoutingMode, ShutdownPolicy,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatchError;
use crate::item::{Payload, WorkItem};
use crate::metrics::{ShardMetrics, ShardMetricsSnapshot};
use crate::queue::{self, PushError};
use crate::router::Router;
use crate::worker::{ShardWorker, WorkerContext};

/// How often a worker calling `stop` re-checks a contended lifecycle lock
const WORKER_STOP_POLL: Duration = Duration::from_millis(1);

/// Dispatcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    /// Whether `submit` may enqueue in this state
    pub fn accepts_submissions(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder<P> {
    name: String,
    shard_count: usize,
    buffer_size: usize,
    hash_fn: Option<HashFn>,
    shutdown_policy: ShutdownPolicy,
    handler_timeout: Option<Duration>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> DispatcherBuilder<P> {
    /// Create a new builder with default buffer size and drain-then-stop policy
    pub fn new(name: impl Into<String>, shard_count: usize) -> Self {
        Self::from_config(&DispatcherConfig::new(name, shard_count))
    }

    /// Create a builder from loaded configuration
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self {
            name: config.name.clone(),
            shard_count: config.shard_count,
            buffer_size: config.buffer_size,
            hash_fn: None,
            shutdown_policy: config.shutdown_policy,
            handler_timeout: config.handler_timeout(),
            observers: Vec::new(),
            _payload: PhantomData,
        }
    }

    /// Per-shard queue capacity (0 = rendezvous handoff)
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Replace the default CRC-32 key hash
    pub fn hash_fn(mut self, hash_fn: HashFn) -> Self {
        self.hash_fn = Some(hash_fn);
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Bound every handler invocation; overruns are reported as timeouts
    pub fn handler_timeout(mut self, limit: Duration) -> Self {
        self.handler_timeout = Some(limit);
        self
    }

    /// Add an instrumentation observer (may be called repeatedly)
    pub fn observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate parameters and create the queues; workers start on `start()`
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(dispatcher = %self.name, shards = self.shard_count, buffer_size = self.buffer_size)
    )]
    pub fn build(self) -> Result<Dispatcher<P>, DispatchError> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::invalid_config(
                "name",
                "dispatcher name cannot be empty",
            ));
        }
        if self.handler_timeout == Some(Duration::ZERO) {
            return Err(DispatchError::invalid_config(
                "handler_timeout",
                "handler timeout must be > 0",
            ));
        }
        let router = Router::new(self.shard_count, self.hash_fn)?;

        let (senders, receivers) = queue::shard_queues(self.shard_count, self.buffer_size);
        let (cancel_tx, cancel_rx) = bounded(0);
        let metrics = (0..self.shard_count)
            .map(|_| Arc::new(ShardMetrics::new()))
            .collect();

        info!(
            policy = ?self.shutdown_policy,
            handler_timeout = ?self.handler_timeout,
            observers = self.observers.len(),
            "Dispatcher created"
        );

        Ok(Dispatcher {
            router,
            buffer_size: self.buffer_size,
            state: AtomicU8::new(LifecycleState::Created.as_u8()),
            senders: RwLock::new(Some(senders)),
            worker_threads: RwLock::new(Vec::new()),
            cancel_rx,
            lifecycle: Mutex::new(Lifecycle {
                pending_queues: Some(receivers),
                workers: Vec::new(),
                cancel_tx: Some(cancel_tx),
            }),
            ctx: Arc::new(WorkerContext {
                dispatcher: self.name,
                observers: self.observers,
                shutdown_policy: self.shutdown_policy,
                handler_timeout: self.handler_timeout,
            }),
            metrics,
        })
    }
}

type WorkerHandle<P> = JoinHandle<Receiver<WorkItem<P>>>;

/// Mutable lifecycle resources, guarded by one lock
struct Lifecycle<P> {
    /// Receiving ends waiting for `start` to hand them to workers
    pending_queues: Option<Vec<Receiver<WorkItem<P>>>>,
    /// Each worker returns its queue when it exits
    workers: Vec<WorkerHandle<P>>,
    /// Dropping this broadcasts shutdown to every worker and blocked producer
    cancel_tx: Option<Sender<()>>,
}

/// Sharded dispatcher: N bounded queues, N dedicated worker threads.
///
/// `submit` may be called from any number of threads. Hash routing is
/// lock-free; round-robin routing touches a single atomic cursor.
pub struct Dispatcher<P: Payload> {
    router: Router,
    buffer_size: usize,
    state: AtomicU8,
    /// Sending ends; `None` once stopped
    senders: RwLock<Option<Vec<Sender<WorkItem<P>>>>>,
    /// Worker thread ids, readable without the lifecycle lock
    worker_threads: RwLock<Vec<ThreadId>>,
    cancel_rx: Receiver<()>,
    lifecycle: Mutex<Lifecycle<P>>,
    ctx: Arc<WorkerContext>,
    metrics: Vec<Arc<ShardMetrics>>,
}

impl<P: Payload> Dispatcher<P> {
    /// Create a dispatcher with drain-then-stop policy and no observers.
    ///
    /// Fails if `shard_count == 0`.
    pub fn new(
        name: impl Into<String>,
        shard_count: usize,
        buffer_size: usize,
        hash_fn: Option<HashFn>,
    ) -> Result<Self, DispatchError> {
        let mut builder = DispatcherBuilder::new(name, shard_count).buffer_size(buffer_size);
        if let Some(hash_fn) = hash_fn {
            builder = builder.hash_fn(hash_fn);
        }
        builder.build()
    }

    /// Create a dispatcher from loaded configuration, without observers
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        DispatcherBuilder::from_config(config).build()
    }

    /// Start building a dispatcher
    pub fn builder(name: impl Into<String>, shard_count: usize) -> DispatcherBuilder<P> {
        DispatcherBuilder::new(name, shard_count)
    }

    pub fn name(&self) -> &str {
        &self.ctx.dispatcher
    }

    pub fn shard_count(&self) -> usize {
        self.router.shard_count()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.ctx.shutdown_policy
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Per-shard metrics snapshots, ordered by shard index
    pub fn metrics(&self) -> Vec<ShardMetricsSnapshot> {
        self.metrics
            .iter()
            .enumerate()
            .map(|(index, m)| m.snapshot(index))
            .collect()
    }

    /// Spawn one worker thread per shard.
    ///
    /// No-op while running. Fails once the dispatcher has been stopped.
    #[instrument(name = "dispatcher_start", skip(self), fields(dispatcher = %self.name()))]
    pub fn start(&self) -> Result<(), DispatchError> {
        let name = self.name().to_string();
        self.start_with(|index, worker| spawn_worker(&name, index, worker))
    }

    fn start_with<F>(&self, mut spawn: F) -> Result<(), DispatchError>
    where
        F: FnMut(usize, ShardWorker<P>) -> io::Result<WorkerHandle<P>>,
    {
        let mut lifecycle = self.lock_lifecycle();
        match self.state() {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Stopping | LifecycleState::Stopped => {
                return Err(DispatchError::Stopped {
                    name: self.name().to_string(),
                });
            }
            LifecycleState::Created => {}
        }

        let mut queues = lifecycle
            .pending_queues
            .take()
            .unwrap_or_default()
            .into_iter()
            .enumerate();
        while let Some((index, queue)) = queues.next() {
            // A failed spawn drops the worker along with its receiver
            let retained = queue.clone();
            let worker = ShardWorker::new(
                index,
                queue,
                self.cancel_rx.clone(),
                Arc::clone(&self.ctx),
                Arc::clone(&self.metrics[index]),
            );

            match spawn(index, worker) {
                Ok(handle) => {
                    self.write_worker_threads().push(handle.thread().id());
                    lifecycle.workers.push(handle);
                }
                Err(source) => {
                    error!(shard = index, error = %source, "Failed to spawn shard worker");
                    self.shutdown(&mut lifecycle);
                    for (index, queue) in std::iter::once((index, retained)).chain(queues) {
                        self.discard_never_started(index, &queue);
                    }
                    return Err(DispatchError::Spawn {
                        name: self.name().to_string(),
                        shard: index,
                        source,
                    });
                }
            }
        }

        self.set_state(LifecycleState::Running);
        info!(
            shards = self.shard_count(),
            buffer_size = self.buffer_size,
            "Dispatcher started"
        );
        Ok(())
    }

    /// Route `item` and push it onto its shard queue.
    ///
    /// Blocks while the target shard queue is full. Returns `true` once the
    /// item is queued, which says nothing about how its handler will fare:
    /// handler failures are only visible to observers and shard metrics.
    ///
    /// Returns `false` for `None` and for any submission after `stop`.
    pub fn submit(&self, item: impl Into<Option<WorkItem<P>>>, mode: RoutingMode) -> bool {
        self.submit_indexed(item, mode).is_some()
    }

    /// Like [`submit`](Self::submit), returning the shard the item was queued on
    pub fn submit_indexed(
        &self,
        item: impl Into<Option<WorkItem<P>>>,
        mode: RoutingMode,
    ) -> Option<usize> {
        let mut item = item.into()?;

        if !self.state().accepts_submissions() {
            warn!(
                dispatcher = %self.name(),
                key = %item.key(),
                state = %self.state(),
                "Submit rejected, dispatcher stopped"
            );
            return None;
        }

        let shard_index = self.router.route(item.key(), mode);
        // Held across the push: `stop` cannot close the queues under a producer
        let senders = self.read_senders();
        let sender = senders.as_ref()?.get(shard_index)?;

        item.mark_enqueued(shard_index);
        debug!(
            dispatcher = %self.name(),
            key = %item.key(),
            shard = shard_index,
            mode = %mode,
            handler = %item.handler_name(),
            "Work item enqueued"
        );

        let key = item.key().to_string();
        match queue::push(sender, item, &self.cancel_rx) {
            Ok(()) => {
                let metrics = &self.metrics[shard_index];
                metrics.inc_submitted_count();
                metrics.set_queue_len(sender.len());
                Some(shard_index)
            }
            Err(reason) => {
                warn!(
                    dispatcher = %self.name(),
                    key = %key,
                    shard = shard_index,
                    cancelled = reason == PushError::Cancelled,
                    "Submit rejected during shutdown"
                );
                None
            }
        }
    }

    /// Stop every worker.
    ///
    /// `Drain` waits for queued items to run; `Immediate` discards and
    /// reports them. Idempotent; concurrent callers return once the
    /// dispatcher is fully stopped.
    ///
    /// Called from a handler, `stop` joins every other worker and returns;
    /// the calling worker exits by itself once its handler returns. If
    /// another thread is already stopping the dispatcher, a worker caller
    /// returns immediately instead of waiting to be joined.
    #[instrument(name = "dispatcher_stop", skip(self), fields(dispatcher = %self.name()))]
    pub fn stop(&self) {
        let lifecycle = if self.on_worker_thread() {
            self.lock_lifecycle_from_worker()
        } else {
            Some(self.lock_lifecycle())
        };
        let Some(mut lifecycle) = lifecycle else {
            debug!("Stop already in progress, worker continues");
            return;
        };
        if self.state() == LifecycleState::Stopped {
            return;
        }
        self.shutdown(&mut lifecycle);
    }

    /// Shutdown sequence; caller holds the lifecycle lock
    fn shutdown(&self, lifecycle: &mut Lifecycle<P>) {
        self.set_state(LifecycleState::Stopping);
        info!(
            policy = ?self.ctx.shutdown_policy,
            workers = lifecycle.workers.len(),
            "Dispatcher stopping"
        );

        // Broadcast: every worker and every blocked producer observes the disconnect
        lifecycle.cancel_tx.take();
        // Waits out in-flight pushes, then closes every queue so draining
        // workers see end-of-queue
        self.write_senders().take();

        if let Some(queues) = lifecycle.pending_queues.take() {
            for (index, queue) in queues.iter().enumerate() {
                self.discard_never_started(index, queue);
            }
        }

        let current = thread::current().id();
        for (index, handle) in lifecycle.workers.drain(..).enumerate() {
            if handle.thread().id() == current {
                // Stopped from this worker's handler; it exits after the handler returns
                debug!(shard = index, "Worker stopping itself, not joined");
                continue;
            }
            match handle.join() {
                Ok(queue) => {
                    let discarded = self.ctx.discard_pending(
                        index,
                        &queue,
                        &self.metrics[index],
                        DiscardReason::Shutdown,
                    );
                    if discarded > 0 {
                        debug!(shard = index, discarded, "Discarded items left after worker exit");
                    }
                }
                Err(e) => error!(shard = index, error = ?e, "Shard worker panicked"),
            }
        }

        self.set_state(LifecycleState::Stopped);
        info!("Dispatcher stopped");
    }

    fn discard_never_started(&self, index: usize, queue: &Receiver<WorkItem<P>>) {
        let discarded = self.ctx.discard_pending(
            index,
            queue,
            &self.metrics[index],
            DiscardReason::NeverStarted,
        );
        if discarded > 0 {
            warn!(shard = index, discarded, "Discarded items queued before start");
        }
    }

    fn on_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&current)
    }

    fn write_worker_threads(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ThreadId>> {
        self.worker_threads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle<P>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lifecycle lock for a worker thread; `None` once another thread is
    /// stopping the dispatcher, since that thread may be joining this worker
    fn lock_lifecycle_from_worker(&self) -> Option<MutexGuard<'_, Lifecycle<P>>> {
        loop {
            match self.lifecycle.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if !self.state().accepts_submissions() {
                        return None;
                    }
                    thread::sleep(WORKER_STOP_POLL);
                }
            }
        }
    }

    fn read_senders(&self) -> std::sync::RwLockReadGuard<'_, Option<Vec<Sender<WorkItem<P>>>>> {
        self.senders.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_senders(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Option<Vec<Sender<WorkItem<P>>>>> {
        self.senders.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_worker<P: Payload>(
    name: &str,
    index: usize,
    worker: ShardWorker<P>,
) -> io::Result<WorkerHandle<P>> {
    thread::Builder::new()
        .name(format!("{name}-shard-{index}"))
        .spawn(move || worker.run())
}

impl<P: Payload> Drop for Dispatcher<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<P: Payload> fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name())
            .field("shard_count", &self.shard_count())
            .field("buffer_size", &self.buffer_size)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
