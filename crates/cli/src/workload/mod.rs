//! Synthetic workload used by the `run` command.

mod generator;
mod stats;

pub use generator::{SyntheticJob, Workload, WorkloadConfig};
pub use stats::RunStats;
