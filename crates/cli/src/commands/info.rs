//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::AppConfig;
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    version: String,
    dispatcher: DispatcherInfo<'a>,
    load: LoadInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_port: Option<u16>,
}

#[derive(Serialize)]
struct DispatcherInfo<'a> {
    name: &'a str,
    shard_count: usize,
    buffer_size: usize,
    shutdown_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    handler_timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct LoadInfo {
    producers: usize,
    items_per_producer: u64,
    total_items: u64,
    key_space: usize,
    mode: String,
    handler_delay_ms: u64,
    fail_every: u64,
    panic_every: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(&args.config)?;

    if args.json {
        let info = build_config_info(&config);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &AppConfig) -> ConfigInfo<'_> {
    let dispatcher = &config.dispatcher;
    let load = &config.load;

    ConfigInfo {
        version: format!("{:?}", config.version),
        dispatcher: DispatcherInfo {
            name: &dispatcher.name,
            shard_count: dispatcher.shard_count,
            buffer_size: dispatcher.buffer_size,
            shutdown_policy: format!("{:?}", dispatcher.shutdown_policy).to_lowercase(),
            handler_timeout_ms: dispatcher.handler_timeout_ms,
        },
        load: LoadInfo {
            producers: load.producers,
            items_per_producer: load.items_per_producer,
            total_items: load.producers as u64 * load.items_per_producer,
            key_space: load.key_space,
            mode: load.mode.to_string(),
            handler_delay_ms: load.handler_delay_ms,
            fail_every: load.fail_every,
            panic_every: load.panic_every,
        },
        metrics_port: config.observability.metrics_port,
    }
}

fn print_config_info(config: &AppConfig) {
    let dispatcher = &config.dispatcher;
    let load = &config.load;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                   shardq Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🧩 Dispatcher");
    println!("   ├─ Version: {:?}", config.version);
    println!("   ├─ Name: {}", dispatcher.name);
    println!("   ├─ Shards: {}", dispatcher.shard_count);
    if dispatcher.buffer_size == 0 {
        println!("   ├─ Buffer: rendezvous (0)");
    } else {
        println!("   ├─ Buffer: {} per shard", dispatcher.buffer_size);
    }
    println!("   ├─ Shutdown policy: {:?}", dispatcher.shutdown_policy);
    match dispatcher.handler_timeout_ms {
        Some(ms) => println!("   └─ Handler timeout: {} ms", ms),
        None => println!("   └─ Handler timeout: none"),
    }

    println!("\n⚙️  Load");
    println!("   ├─ Producers: {}", load.producers);
    println!("   ├─ Items per producer: {}", load.items_per_producer);
    println!("   ├─ Key space: {}", load.key_space);
    println!("   ├─ Routing: {}", load.mode);
    println!("   ├─ Handler delay: {} ms", load.handler_delay_ms);
    println!(
        "   └─ Faults: fail every {}, panic every {}",
        load.fail_every, load.panic_every
    );

    println!("\n📡 Observability");
    println!("   ├─ Log format: {:?}", config.observability.log_format);
    match config.observability.metrics_port {
        Some(port) => println!("   └─ Metrics port: {}", port),
        None => println!("   └─ Metrics port: disabled"),
    }

    println!();
}
