//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::AppConfig;
use std::time::Duration;
use tracing::{info, warn};

use super::load_config;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::workload::{Workload, WorkloadConfig};

/// Execute the `run` command
pub async fn run_workload(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, args)?;

    info!(
        dispatcher = %config.dispatcher.name,
        shards = config.dispatcher.shard_count,
        buffer_size = config.dispatcher.buffer_size,
        policy = ?config.dispatcher.shutdown_policy,
        producers = config.load.producers,
        items_per_producer = config.load.items_per_producer,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if let Some(port) = config.observability.metrics_port {
        observability::init_metrics_only(port)?;
        info!("Metrics endpoint available on port {}", port);
    }

    let workload = Workload::new(WorkloadConfig {
        dispatcher: config.dispatcher,
        load: config.load,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
    });

    info!("Starting workload...");
    let stats = workload
        .run(shutdown_signal())
        .await
        .context("Workload execution failed")?;

    info!(
        executed = stats.summary.total_items,
        discarded = stats.summary.discarded,
        throughput = format!("{:.2}", stats.throughput()),
        "Run completed"
    );
    stats.print_summary();

    Ok(())
}

/// Apply command-line overrides, then re-run validation
fn apply_overrides(config: &mut AppConfig, args: &RunArgs) -> Result<()> {
    if let Some(shards) = args.shards {
        info!(shards, "Overriding shard count from CLI");
        config.dispatcher.shard_count = shards;
    }
    if let Some(buffer_size) = args.buffer_size {
        info!(buffer_size, "Overriding buffer size from CLI");
        config.dispatcher.buffer_size = buffer_size;
    }
    if let Some(mode) = args.mode {
        config.load.mode = mode.into();
    }
    if let Some(producers) = args.producers {
        config.load.producers = producers;
    }
    if let Some(items) = args.items {
        config.load.items_per_producer = items;
    }
    if let Some(port) = args.metrics_port {
        config.observability.metrics_port = (port != 0).then_some(port);
    }

    config_loader::ConfigLoader::validate(config).map_err(|e| match e {
        contracts::ContractError::ConfigValidation { field, message } => {
            CliError::invalid_override(field, message).into()
        }
        other => anyhow::Error::from(other),
    })
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &AppConfig) {
    let dispatcher = &config.dispatcher;
    let load = &config.load;

    println!("\n=== Configuration Summary ===\n");
    println!("Dispatcher:");
    println!("  Name: {}", dispatcher.name);
    println!("  Shards: {}", dispatcher.shard_count);
    println!("  Buffer size: {}", dispatcher.buffer_size);
    println!("  Shutdown policy: {:?}", dispatcher.shutdown_policy);
    match dispatcher.handler_timeout_ms {
        Some(ms) => println!("  Handler timeout: {} ms", ms),
        None => println!("  Handler timeout: none"),
    }

    println!("\nLoad:");
    println!(
        "  {} producers x {} items, {} keys, {} routing",
        load.producers, load.items_per_producer, load.key_space, load.mode
    );
    if load.fail_every > 0 || load.panic_every > 0 {
        println!(
            "  Faults: fail every {}, panic every {}",
            load.fail_every, load.panic_every
        );
    }

    println!();
}
