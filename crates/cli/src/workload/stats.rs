//! Run statistics.

use std::time::Duration;

use dispatcher::ShardMetricsSnapshot;
use observability::ExecutionSummary;

/// Statistics from a workload run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Items accepted by `submit`
    pub accepted: u64,

    /// Items rejected because the dispatcher had stopped
    pub rejected: u64,

    /// Wall time from dispatcher start to full stop
    pub duration: Duration,

    /// Stopped by signal or timeout before producers finished
    pub interrupted: bool,

    /// Final per-shard counters
    pub shards: Vec<ShardMetricsSnapshot>,

    /// Aggregated execution reports
    pub summary: ExecutionSummary,
}

impl RunStats {
    /// Executed items per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.summary.total_items as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Largest shard load divided by the mean shard load (1.0 = perfectly even)
    pub fn imbalance(&self) -> f64 {
        let loads: Vec<u64> = self.shards.iter().map(|s| s.executed_count()).collect();
        let total: u64 = loads.iter().sum();
        if loads.is_empty() || total == 0 {
            return 0.0;
        }
        let mean = total as f64 / loads.len() as f64;
        loads.iter().copied().max().unwrap_or(0) as f64 / mean
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Run Statistics                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Accepted: {}", self.accepted);
        println!("   ├─ Rejected: {}", self.rejected);
        println!("   ├─ Throughput: {:.2} items/s", self.throughput());
        println!("   ├─ Shard imbalance: {:.2}", self.imbalance());
        println!("   └─ Interrupted: {}", self.interrupted);

        let summary = &self.summary;
        println!("\n📈 Execution");
        println!("   ├─ Succeeded: {}", summary.succeeded);
        println!(
            "   ├─ Errors: {} failed, {} panicked, {} timed out ({:.2}%)",
            summary.failed, summary.panicked, summary.timed_out, summary.error_rate
        );
        println!("   ├─ Discarded: {}", summary.discarded);
        println!("   ├─ Queue wait (ms): {}", summary.queue_wait_ms);
        println!("   ├─ Execution (ms): {}", summary.exec_ms);
        println!("   └─ Total (ms): {}", summary.total_ms);

        if !self.shards.is_empty() {
            println!("\n🧩 Shards");
            for (i, shard) in self.shards.iter().enumerate() {
                let prefix = if i == self.shards.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                println!(
                    "   {} shard {}: submitted={} ok={} failed={} panicked={} timed_out={} discarded={}",
                    prefix,
                    shard.shard_index,
                    shard.submitted_count,
                    shard.completed_count,
                    shard.failure_count,
                    shard.panic_count,
                    shard.timeout_count,
                    shard.discarded_count
                );
            }
        }

        println!();
    }
}
