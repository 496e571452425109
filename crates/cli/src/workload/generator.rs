//! Workload generator - producer threads feeding one dispatcher.
//!
//! Producers are plain blocking threads: a full shard queue blocks them,
//! which is exactly the backpressure the run is meant to show.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use contracts::{DispatcherConfig, HandlerError, LoadConfig};
use dispatcher::{
    named, Dispatcher, DispatcherBuilder, DispatcherHandle, HandlerRef, TracingObserver, WorkItem,
};
use observability::{record_queue_depth, record_submission, MetricsObserver};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::RunStats;
use crate::error::CliError;

/// How often shard queue depths are exported while the run is in progress
const DEPTH_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Payload carried by synthetic work items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticJob {
    pub producer: usize,
    /// Position in the global submission sequence
    pub seq: u64,
}

/// Workload configuration
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub dispatcher: DispatcherConfig,
    pub load: LoadConfig,
    /// Stop producing after this long (None = run to completion)
    pub timeout: Option<Duration>,
}

/// Submission counters shared by producers
#[derive(Debug, Default)]
struct SubmitCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

/// Drives one dispatcher with synthetic load
pub struct Workload {
    config: WorkloadConfig,
}

impl Workload {
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }

    /// Run until every producer finishes, `shutdown` resolves, or the timeout elapses
    #[instrument(name = "workload_run", skip_all, fields(dispatcher = %self.config.dispatcher.name))]
    pub async fn run<F>(self, shutdown: F) -> Result<RunStats>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let WorkloadConfig {
            dispatcher: dispatcher_config,
            load,
            timeout,
        } = self.config;

        let observer = Arc::new(MetricsObserver::new());
        let dispatcher: Dispatcher<SyntheticJob> = DispatcherBuilder::from_config(&dispatcher_config)
            .observer(observer.clone())
            .observer(Arc::new(TracingObserver::new()))
            .build()
            .map_err(CliError::from)?;
        let handle = DispatcherHandle::spawn(dispatcher).map_err(CliError::from)?;

        info!(
            shards = dispatcher_config.shard_count,
            buffer_size = dispatcher_config.buffer_size,
            producers = load.producers,
            items_per_producer = load.items_per_producer,
            mode = %load.mode,
            "Workload started"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(SubmitCounters::default());
        let handler = synthetic_handler(&load);

        let mut producers = JoinSet::new();
        for producer in 0..load.producers {
            let dispatcher = Arc::clone(handle.dispatcher());
            let load = load.clone();
            let handler = handler.clone();
            let stop = Arc::clone(&stop);
            let counters = Arc::clone(&counters);
            producers.spawn_blocking(move || {
                produce(producer, &load, &dispatcher, &handler, &stop, &counters)
            });
        }

        let sampler = {
            let handle = handle.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(DEPTH_SAMPLE_INTERVAL);
                loop {
                    interval.tick().await;
                    for shard in handle.metrics() {
                        record_queue_depth(handle.name(), shard.shard_index, shard.queue_len);
                    }
                }
            })
        };

        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        let interrupted = tokio::select! {
            result = join_producers(&mut producers) => {
                result?;
                false
            }
            _ = &mut shutdown => {
                warn!("Shutdown signal received, stopping producers");
                true
            }
            _ = &mut deadline => {
                warn!(timeout = ?timeout, "Run timeout reached, stopping producers");
                true
            }
        };

        if interrupted {
            stop.store(true, Ordering::Release);
            // Stopping first releases producers blocked on a full shard
            handle.stop().await;
            join_producers(&mut producers).await?;
        } else {
            handle.stop().await;
        }
        sampler.abort();

        let stats = RunStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            duration: started.elapsed(),
            interrupted,
            shards: handle.metrics(),
            summary: observer.summary(),
        };

        info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            duration_secs = stats.duration.as_secs_f64(),
            "Workload finished"
        );
        Ok(stats)
    }
}

async fn join_producers(producers: &mut JoinSet<()>) -> Result<(), CliError> {
    while let Some(result) = producers.join_next().await {
        result.map_err(|e| CliError::workload(format!("producer thread failed: {e}")))?;
    }
    Ok(())
}

/// Body of one producer thread
fn produce(
    producer: usize,
    load: &LoadConfig,
    dispatcher: &Dispatcher<SyntheticJob>,
    handler: &HandlerRef<SyntheticJob>,
    stop: &AtomicBool,
    counters: &SubmitCounters,
) {
    let first = producer as u64 * load.items_per_producer;
    let key_space = load.key_space.max(1) as u64;

    for seq in first..first + load.items_per_producer {
        if stop.load(Ordering::Acquire) {
            break;
        }

        let job = SyntheticJob { producer, seq };
        let key = format!("key-{}", seq % key_space);
        let accepted = dispatcher.submit(WorkItem::new(key, job, handler.clone()), load.mode);
        record_submission(dispatcher.name(), accepted);

        if accepted {
            counters.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            // Only a stopped dispatcher rejects a present item
            break;
        }
    }

    debug!(producer, "Producer finished");
}

/// Handler shared by every synthetic item
///
/// Sleeps `handler_delay_ms`, then fails or panics on every n-th item of the
/// global sequence as configured.
fn synthetic_handler(load: &LoadConfig) -> HandlerRef<SyntheticJob> {
    let delay = Duration::from_millis(load.handler_delay_ms);
    let fail_every = load.fail_every;
    let panic_every = load.panic_every;

    named("synthetic", move |job: &SyntheticJob| {
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let n = job.seq + 1;
        if panic_every > 0 && n % panic_every == 0 {
            panic!("synthetic panic at item {}", job.seq);
        }
        if fail_every > 0 && n % fail_every == 0 {
            return Err(HandlerError::failed(format!(
                "synthetic failure at item {}",
                job.seq
            )));
        }
        Ok(())
    })
}
