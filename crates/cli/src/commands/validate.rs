//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AppConfig, RoutingMode, ShutdownPolicy};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    dispatcher: String,
    shard_count: usize,
    buffer_size: usize,
    total_items: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    dispatcher: config.dispatcher.name.clone(),
                    shard_count: config.dispatcher.shard_count,
                    buffer_size: config.dispatcher.buffer_size,
                    total_items: config.load.producers as u64 * config.load.items_per_producer,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let dispatcher = &config.dispatcher;
    let load = &config.load;

    if dispatcher.buffer_size == 0 {
        warnings.push(
            "dispatcher.buffer_size is 0 - every submit waits for a worker handoff".to_string(),
        );
    }

    if load.mode == RoutingMode::Hash && load.key_space < dispatcher.shard_count {
        warnings.push(format!(
            "load.key_space ({}) < shard_count ({}) - hash routing leaves shards idle",
            load.key_space, dispatcher.shard_count
        ));
    }

    if dispatcher.shutdown_policy == ShutdownPolicy::Immediate {
        warnings.push(
            "shutdown_policy is immediate - queued items are discarded on stop".to_string(),
        );
    }

    if dispatcher.handler_timeout_ms.is_some() {
        warnings.push(
            "handler_timeout_ms is set - each item runs on a supervised helper thread".to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Dispatcher: {}", summary.dispatcher);
            println!("  Shards: {}", summary.shard_count);
            println!("  Buffer size: {}", summary.buffer_size);
            println!("  Items: {}", summary.total_items);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
