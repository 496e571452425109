//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::RoutingMode;
use std::path::{Path, PathBuf};

/// shardq - sharded keyed dispatch engine
#[derive(Parser, Debug)]
#[command(
    name = "shardq",
    author,
    version,
    about = "Sharded keyed dispatch engine",
    long_about = "Routes keyed work items onto a fixed set of shards, each with a bounded \n\
                  FIFO queue and a dedicated worker thread.\n\n\
                  `run` drives a dispatcher with synthetic load described in the \n\
                  configuration file and prints per-shard statistics."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SHARDQ_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (overrides observability.log_format)
    #[arg(long, value_enum, global = true, env = "SHARDQ_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a dispatcher under synthetic load
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

impl Commands {
    /// Configuration file named by the subcommand
    pub fn config_path(&self) -> &Path {
        match self {
            Self::Run(args) => &args.config,
            Self::Validate(args) => &args.config,
            Self::Info(args) => &args.config,
        }
    }
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "shardq.toml", env = "SHARDQ_CONFIG")]
    pub config: PathBuf,

    /// Override dispatcher.shard_count
    #[arg(long, env = "SHARDQ_SHARDS")]
    pub shards: Option<usize>,

    /// Override dispatcher.buffer_size (0 = rendezvous)
    #[arg(long, env = "SHARDQ_BUFFER_SIZE")]
    pub buffer_size: Option<usize>,

    /// Override load.mode
    #[arg(long, value_enum, env = "SHARDQ_MODE")]
    pub mode: Option<RouteArg>,

    /// Override load.producers
    #[arg(long, env = "SHARDQ_PRODUCERS")]
    pub producers: Option<usize>,

    /// Override load.items_per_producer
    #[arg(long, env = "SHARDQ_ITEMS")]
    pub items: Option<u64>,

    /// Override observability.metrics_port (0 = disabled)
    #[arg(long, env = "SHARDQ_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Stop the run after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "SHARDQ_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "shardq.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "shardq.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Routing mode as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteArg {
    /// Same key, same shard
    Hash,
    /// Rotate across shards, ignoring the key
    #[value(alias = "rr")]
    RoundRobin,
}

impl From<RouteArg> for RoutingMode {
    fn from(arg: RouteArg) -> Self {
        match arg {
            RouteArg::Hash => Self::Hash,
            RouteArg::RoundRobin => Self::RoundRobin,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "shardq",
            "run",
            "-c",
            "load.toml",
            "--shards",
            "8",
            "--buffer-size",
            "0",
            "--mode",
            "round-robin",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config, PathBuf::from("load.toml"));
        assert_eq!(args.shards, Some(8));
        assert_eq!(args.buffer_size, Some(0));
        assert_eq!(args.mode.map(RoutingMode::from), Some(RoutingMode::RoundRobin));
        assert_eq!(args.items, None);
    }

    #[test]
    fn test_log_format_flag_is_optional() {
        let cli = Cli::try_parse_from(["shardq", "validate", "-c", "a.toml"]).unwrap();
        assert_eq!(cli.log_format, None);
        assert_eq!(cli.command.config_path(), Path::new("a.toml"));

        let cli = Cli::try_parse_from(["shardq", "--log-format", "json", "info"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.command.config_path(), Path::new("shardq.toml"));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["shardq", "-q", "-v", "info"]).is_err());
    }
}
