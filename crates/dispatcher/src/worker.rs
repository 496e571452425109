//! Shard worker - one dedicated thread draining one shard queue
//!
//! Handlers run synchronously on the worker thread, so a slow handler stalls
//! every key routed to its shard.
//!
//! With a handler timeout configured, handlers run on one supervised helper
//! thread per shard, reused from item to item, and an overrun is reported as
//! `HandlerError::TimedOut`. The overrunning helper is abandoned rather than
//! killed:
//! - its handler keeps running alongside the next item of the same shard,
//!   which a fresh helper picks up
//! - a handler that never returns pins its helper thread for the life of the
//!   process, so every such overrun leaves one more thread behind

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    DiscardReason, DiscardReport, ExecutionObserver, ExecutionReport, HandlerError,
    HandlerResult, ShutdownPolicy,
};
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, instrument, trace};

use crate::item::{Payload, WorkItem};
use crate::metrics::ShardMetrics;

/// Longest payload rendering included in fault logs
const PAYLOAD_SUMMARY_MAX_CHARS: usize = 256;

/// State shared by every worker of one dispatcher
pub(crate) struct WorkerContext {
    pub(crate) dispatcher: String,
    pub(crate) observers: Vec<Arc<dyn ExecutionObserver>>,
    pub(crate) shutdown_policy: ShutdownPolicy,
    pub(crate) handler_timeout: Option<Duration>,
}

impl WorkerContext {
    fn notify_complete(&self, report: &ExecutionReport) {
        for observer in &self.observers {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_complete(report)));
            if let Err(cause) = delivered {
                error!(
                    dispatcher = %self.dispatcher,
                    shard = report.shard_index,
                    key = %report.key,
                    panic = %panic_message(cause),
                    "Observer panicked on completion report"
                );
            }
        }
    }

    fn notify_discard(&self, report: &DiscardReport) {
        for observer in &self.observers {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_discard(report)));
            if let Err(cause) = delivered {
                error!(
                    dispatcher = %self.dispatcher,
                    shard = report.shard_index,
                    key = %report.key,
                    panic = %panic_message(cause),
                    "Observer panicked on discard report"
                );
            }
        }
    }

    /// Report every item still queued as discarded; returns how many
    pub(crate) fn discard_pending<P>(
        &self,
        shard_index: usize,
        queue: &Receiver<WorkItem<P>>,
        metrics: &ShardMetrics,
        reason: DiscardReason,
    ) -> usize {
        let mut discarded = 0;
        for item in queue.try_iter() {
            metrics.inc_discarded_count();
            self.notify_discard(&DiscardReport {
                dispatcher: self.dispatcher.clone(),
                key: item.key().to_string(),
                shard_index: item.shard_index().unwrap_or(shard_index),
                handler: item.handler_name().to_string(),
                wait: item.wait(),
                reason,
            });
            discarded += 1;
        }
        metrics.set_queue_len(queue.len());
        discarded
    }
}

/// Helper thread that runs one shard's handlers under a time limit
struct Supervisor<P> {
    jobs: Sender<WorkItem<P>>,
    results: Receiver<Result<HandlerResult, String>>,
    thread: JoinHandle<()>,
}

impl<P: Payload> Supervisor<P> {
    fn spawn(name: String) -> io::Result<Self> {
        let (jobs, job_rx) = bounded::<WorkItem<P>>(1);
        let (result_tx, results) = bounded(1);
        let thread = thread::Builder::new().name(name).spawn(move || {
            for mut item in job_rx {
                let result = panic::catch_unwind(AssertUnwindSafe(|| item.invoke()));
                item.mark_completed();
                // Disconnected once the worker has given up on this helper
                if result_tx.send(result.map_err(panic_message)).is_err() {
                    break;
                }
            }
        })?;
        Ok(Self {
            jobs,
            results,
            thread,
        })
    }

    /// Close the job channel and wait for the idle helper to exit
    fn shutdown(self) {
        drop(self.jobs);
        let _ = self.thread.join();
    }
}

/// Worker bound to one shard
pub(crate) struct ShardWorker<P> {
    index: usize,
    queue: Receiver<WorkItem<P>>,
    cancel: Receiver<()>,
    ctx: Arc<WorkerContext>,
    metrics: Arc<ShardMetrics>,
    supervisor: Option<Supervisor<P>>,
}

impl<P: Payload> ShardWorker<P> {
    pub(crate) fn new(
        index: usize,
        queue: Receiver<WorkItem<P>>,
        cancel: Receiver<()>,
        ctx: Arc<WorkerContext>,
        metrics: Arc<ShardMetrics>,
    ) -> Self {
        Self {
            index,
            queue,
            cancel,
            ctx,
            metrics,
            supervisor: None,
        }
    }

    /// Worker loop
    ///
    /// - `Drain`: runs until every sender is gone and the queue is empty
    /// - `Immediate`: additionally exits as soon as shutdown is broadcast,
    ///   discarding whatever is still queued
    ///
    /// Hands the queue back on exit so the owner can account for anything
    /// pushed after the final drain.
    #[instrument(
        name = "shard_worker_loop",
        skip(self),
        fields(dispatcher = %self.ctx.dispatcher, shard = self.index)
    )]
    pub(crate) fn run(mut self) -> Receiver<WorkItem<P>> {
        debug!("Shard worker started");

        let mut executed: u64 = 0;
        loop {
            let next = match self.ctx.shutdown_policy {
                ShutdownPolicy::Drain => self.queue.recv().ok(),
                ShutdownPolicy::Immediate => {
                    if self.cancelled() {
                        None
                    } else {
                        select! {
                            recv(self.queue) -> msg => msg.ok(),
                            recv(self.cancel) -> _ => None,
                        }
                    }
                }
            };

            let Some(item) = next else { break };
            self.execute(item);
            executed += 1;
        }

        let discarded = match self.ctx.shutdown_policy {
            ShutdownPolicy::Drain => 0,
            ShutdownPolicy::Immediate => self.ctx.discard_pending(
                self.index,
                &self.queue,
                &self.metrics,
                DiscardReason::Shutdown,
            ),
        };

        if let Some(supervisor) = self.supervisor.take() {
            supervisor.shutdown();
        }

        debug!(executed, discarded, "Shard worker stopped");
        self.queue
    }

    /// Shutdown is broadcast by disconnecting the cancel channel
    fn cancelled(&self) -> bool {
        matches!(self.cancel.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn execute(&mut self, mut item: WorkItem<P>) {
        item.mark_dequeued();
        self.metrics.set_queue_len(self.queue.len());

        let key = item.key().to_string();
        let handler = item.handler_name().to_string();
        let dequeued_at = item.dequeued_at().unwrap_or_else(Instant::now);
        let enqueued_at = item.enqueued_at().unwrap_or(dequeued_at);

        trace!(
            shard = self.index,
            key = %key,
            handler = %handler,
            wait_us = dequeued_at.saturating_duration_since(enqueued_at).as_micros() as u64,
            "Work item dequeued"
        );

        let outcome = match self.ctx.handler_timeout {
            None => self.invoke_guarded(&mut item),
            Some(limit) => self.invoke_bounded(item, limit),
        };
        let completed_at = Instant::now();

        match &outcome {
            Ok(()) => self.metrics.inc_completed_count(),
            Err(e) => self.metrics.record_handler_error(e),
        }

        self.ctx.notify_complete(&ExecutionReport {
            dispatcher: self.ctx.dispatcher.clone(),
            key,
            shard_index: self.index,
            handler,
            wait: dequeued_at.saturating_duration_since(enqueued_at),
            exec: completed_at.saturating_duration_since(dequeued_at),
            total: completed_at.saturating_duration_since(enqueued_at),
            outcome,
        });
    }

    /// Run the handler on the worker thread inside a panic boundary
    fn invoke_guarded(&self, item: &mut WorkItem<P>) -> HandlerResult {
        let result = panic::catch_unwind(AssertUnwindSafe(|| item.invoke()));
        item.mark_completed();

        result.unwrap_or_else(|cause| {
            let message = panic_message(cause);
            error!(
                dispatcher = %self.ctx.dispatcher,
                shard = self.index,
                key = %item.key(),
                handler = %item.handler_name(),
                payload = %payload_summary(item.payload()),
                panic = %message,
                "Handler panicked, worker recovered"
            );
            Err(HandlerError::Panicked(message))
        })
    }

    /// Run the handler on the shard's helper thread and wait at most `limit`
    fn invoke_bounded(&mut self, item: WorkItem<P>, limit: Duration) -> HandlerResult {
        let key = item.key().to_string();
        let summary = payload_summary(item.payload());

        let supervisor = match self.supervisor.take() {
            Some(supervisor) => supervisor,
            None => {
                let name = format!("{}-shard-{}-exec", self.ctx.dispatcher, self.index);
                match Supervisor::spawn(name) {
                    Ok(supervisor) => supervisor,
                    Err(e) => {
                        error!(
                            dispatcher = %self.ctx.dispatcher,
                            shard = self.index,
                            key = %key,
                            error = %e,
                            "Failed to spawn supervised handler thread"
                        );
                        return Err(HandlerError::failed(format!(
                            "supervised execution unavailable: {e}"
                        )));
                    }
                }
            }
        };

        if supervisor.jobs.send(item).is_err() {
            return Err(HandlerError::Panicked(
                "supervised handler thread exited".to_string(),
            ));
        }

        match supervisor.results.recv_timeout(limit) {
            Ok(Ok(result)) => {
                self.supervisor = Some(supervisor);
                result
            }
            Ok(Err(message)) => {
                self.supervisor = Some(supervisor);
                error!(
                    dispatcher = %self.ctx.dispatcher,
                    shard = self.index,
                    key = %key,
                    payload = %summary,
                    panic = %message,
                    "Handler panicked, worker recovered"
                );
                Err(HandlerError::Panicked(message))
            }
            Err(RecvTimeoutError::Timeout) => {
                // Abandoned: the helper exits once its handler returns
                drop(supervisor);
                error!(
                    dispatcher = %self.ctx.dispatcher,
                    shard = self.index,
                    key = %key,
                    payload = %summary,
                    limit_ms = limit.as_millis() as u64,
                    "Handler timed out, worker moved on"
                );
                Err(HandlerError::TimedOut { limit })
            }
            Err(RecvTimeoutError::Disconnected) => Err(HandlerError::Panicked(
                "supervised handler exited without a result".to_string(),
            )),
        }
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(cause: Box<dyn Any + Send>) -> String {
    match cause.downcast::<String>() {
        Ok(message) => *message,
        Err(cause) => match cause.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

/// Debug rendering of a payload, truncated for logs
fn payload_summary<P: std::fmt::Debug>(payload: &P) -> String {
    let mut rendered = format!("{payload:?}");
    if let Some((cut, _)) = rendered.char_indices().nth(PAYLOAD_SUMMARY_MAX_CHARS) {
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    rendered
}
