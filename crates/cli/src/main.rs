//! # shardq CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading and validation
//! - Synthetic load runs against a dispatcher
//! - Graceful shutdown handling

mod cli;
mod commands;
mod error;
mod workload;

use anyhow::Result;
use clap::Parser;
use config_loader::ConfigLoader;
use contracts::ObservabilitySettings;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_validate, run_workload};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "shardq starting");

    let result = match &cli.command {
        Commands::Run(args) => run_workload(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging from the config file's observability settings,
/// with command-line flags taking precedence
fn init_logging(cli: &Cli) -> Result<()> {
    // A missing or invalid file is reported by the command itself
    let settings = ConfigLoader::load_from_path(cli.command.config_path())
        .map(|config| config.observability)
        .unwrap_or_default();

    observability::init_with_config(logging_config(cli, &settings))
}

fn logging_config(cli: &Cli, settings: &ObservabilitySettings) -> ObservabilityConfig {
    let mut config = ObservabilityConfig::from(settings);
    if let Some(format) = cli.log_format {
        config.log_format = format.into();
    }
    config.default_log_level = if cli.quiet {
        "warn".to_string()
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_string()
    };
    // `run` installs the exporter after applying --metrics-port
    config.metrics_port = None;
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::LogFormatSetting;
    use observability::LogFormat;

    fn settings(log_format: LogFormatSetting) -> ObservabilitySettings {
        ObservabilitySettings {
            log_format,
            metrics_port: Some(9100),
        }
    }

    #[test]
    fn test_config_file_log_format_applies() {
        let cli = Cli::try_parse_from(["shardq", "info"]).unwrap();
        let config = logging_config(&cli, &settings(LogFormatSetting::Json));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_log_level, "info");
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn test_flags_override_config_file() {
        let cli =
            Cli::try_parse_from(["shardq", "--log-format", "compact", "-vv", "info"]).unwrap();
        let config = logging_config(&cli, &settings(LogFormatSetting::Json));
        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(config.default_log_level, "trace");

        let cli = Cli::try_parse_from(["shardq", "-q", "info"]).unwrap();
        let config = logging_config(&cli, &settings(LogFormatSetting::Pretty));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.default_log_level, "warn");
    }
}
