//! Dispatch metrics
//!
//! Records execution and discard reports as Prometheus metrics and
//! aggregates them in memory for end-of-run summaries.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use contracts::{DiscardReport, ExecutionObserver, ExecutionReport, HandlerError};
use metrics::{counter, gauge, histogram};

/// Record one finished execution
///
/// Called once per item that reached a handler, whatever the outcome.
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_execution;
///
/// impl ExecutionObserver for MyObserver {
///     fn on_complete(&self, report: &ExecutionReport) {
///         record_execution(report);
///     }
/// }
/// ```
pub fn record_execution(report: &ExecutionReport) {
    let dispatcher = report.dispatcher.clone();
    let shard = report.shard_index.to_string();

    counter!(
        "shardq_items_total",
        "dispatcher" => dispatcher.clone(),
        "shard" => shard.clone(),
        "status" => report.status()
    )
    .increment(1);

    histogram!(
        "shardq_queue_wait_ms",
        "dispatcher" => dispatcher.clone(),
        "shard" => shard.clone()
    )
    .record(as_millis_f64(report.wait));

    histogram!(
        "shardq_exec_ms",
        "dispatcher" => dispatcher.clone(),
        "shard" => shard.clone()
    )
    .record(as_millis_f64(report.exec));

    histogram!(
        "shardq_total_ms",
        "dispatcher" => dispatcher,
        "shard" => shard
    )
    .record(as_millis_f64(report.total));
}

/// Record an item that was accepted but never executed
pub fn record_discard(report: &DiscardReport) {
    counter!(
        "shardq_items_discarded_total",
        "dispatcher" => report.dispatcher.clone(),
        "shard" => report.shard_index.to_string(),
        "reason" => report.reason.as_str()
    )
    .increment(1);
}

/// Record a submission attempt
pub fn record_submission(dispatcher: &str, accepted: bool) {
    let status = if accepted { "accepted" } else { "rejected" };
    counter!(
        "shardq_submissions_total",
        "dispatcher" => dispatcher.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record the approximate depth of one shard queue
pub fn record_queue_depth(dispatcher: &str, shard_index: usize, depth: usize) {
    gauge!(
        "shardq_queue_depth",
        "dispatcher" => dispatcher.to_string(),
        "shard" => shard_index.to_string()
    )
    .set(depth as f64);
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Observer that exports every report as metrics and keeps an in-memory aggregate
#[derive(Debug, Default)]
pub struct MetricsObserver {
    aggregator: Mutex<ExecutionStatsAggregator>,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of everything observed so far
    pub fn summary(&self) -> ExecutionSummary {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }

    pub fn reset(&self) {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

impl ExecutionObserver for MetricsObserver {
    fn on_complete(&self, report: &ExecutionReport) {
        record_execution(report);
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(report);
    }

    fn on_discard(&self, report: &DiscardReport) {
        record_discard(report);
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_discard(report);
    }
}

/// Execution statistics aggregator
///
/// Aggregates reports in memory for summaries and final output.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStatsAggregator {
    pub total_items: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    pub timed_out: u64,
    pub discarded: u64,

    /// Queue wait (ms)
    pub wait_stats: RunningStats,

    /// Handler execution time (ms)
    pub exec_stats: RunningStats,

    /// Enqueue to completion (ms)
    pub total_stats: RunningStats,

    /// Executed items per shard index
    pub shard_counts: BTreeMap<usize, u64>,
}

impl ExecutionStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, report: &ExecutionReport) {
        self.total_items += 1;
        match &report.outcome {
            Ok(()) => self.succeeded += 1,
            Err(HandlerError::Failed(_)) => self.failed += 1,
            Err(HandlerError::Panicked(_)) => self.panicked += 1,
            Err(HandlerError::TimedOut { .. }) => self.timed_out += 1,
        }

        self.wait_stats.push(as_millis_f64(report.wait));
        self.exec_stats.push(as_millis_f64(report.exec));
        self.total_stats.push(as_millis_f64(report.total));
        *self.shard_counts.entry(report.shard_index).or_insert(0) += 1;
    }

    pub fn record_discard(&mut self, _report: &DiscardReport) {
        self.discarded += 1;
    }

    /// Build a summary report
    pub fn summary(&self) -> ExecutionSummary {
        let errors = self.failed + self.panicked + self.timed_out;
        ExecutionSummary {
            total_items: self.total_items,
            succeeded: self.succeeded,
            failed: self.failed,
            panicked: self.panicked,
            timed_out: self.timed_out,
            discarded: self.discarded,
            error_rate: if self.total_items > 0 {
                errors as f64 / self.total_items as f64 * 100.0
            } else {
                0.0
            },
            queue_wait_ms: StatsSummary::from(&self.wait_stats),
            exec_ms: StatsSummary::from(&self.exec_stats),
            total_ms: StatsSummary::from(&self.total_stats),
            shard_counts: self.shard_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Execution summary
#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    pub total_items: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    pub timed_out: u64,
    pub discarded: u64,
    pub error_rate: f64,
    pub queue_wait_ms: StatsSummary,
    pub exec_ms: StatsSummary,
    pub total_ms: StatsSummary,
    pub shard_counts: BTreeMap<usize, u64>,
}

impl std::fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Dispatch Summary ===")?;
        writeln!(f, "Executed items: {}", self.total_items)?;
        writeln!(f, "Succeeded: {}", self.succeeded)?;
        writeln!(
            f,
            "Errors: {} failed, {} panicked, {} timed out ({:.2}%)",
            self.failed, self.panicked, self.timed_out, self.error_rate
        )?;
        writeln!(f, "Discarded: {}", self.discarded)?;
        writeln!(f, "Queue wait (ms): {}", self.queue_wait_ms)?;
        writeln!(f, "Execution (ms): {}", self.exec_ms)?;
        writeln!(f, "Total (ms): {}", self.total_ms)?;

        if !self.shard_counts.is_empty() {
            writeln!(f, "Items per shard:")?;
            for (shard, count) in &self.shard_counts {
                writeln!(f, "  shard {}: {}", shard, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
