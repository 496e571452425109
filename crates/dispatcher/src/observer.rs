//! TracingObserver - logs execution reports via tracing

use contracts::{DiscardReport, ExecutionObserver, ExecutionReport};
use tracing::{debug, warn};

/// Observer that logs every report for debugging
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionObserver for TracingObserver {
    fn on_complete(&self, report: &ExecutionReport) {
        match &report.outcome {
            Ok(()) => debug!(
                dispatcher = %report.dispatcher,
                key = %report.key,
                shard = report.shard_index,
                handler = %report.handler,
                wait_us = report.wait.as_micros() as u64,
                exec_us = report.exec.as_micros() as u64,
                total_us = report.total.as_micros() as u64,
                "Work item completed"
            ),
            Err(e) => warn!(
                dispatcher = %report.dispatcher,
                key = %report.key,
                shard = report.shard_index,
                handler = %report.handler,
                status = report.status(),
                error = %e,
                exec_us = report.exec.as_micros() as u64,
                "Work item failed"
            ),
        }
    }

    fn on_discard(&self, report: &DiscardReport) {
        warn!(
            dispatcher = %report.dispatcher,
            key = %report.key,
            shard = report.shard_index,
            handler = %report.handler,
            reason = report.reason.as_str(),
            wait_us = report.wait.as_micros() as u64,
            "Work item discarded"
        );
    }
}
