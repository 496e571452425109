//! AppConfig - Config Loader output
//!
//! Describes a dispatcher, the synthetic load used by the CLI, and the
//! observability settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RoutingMode;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Dispatcher settings
    pub dispatcher: DispatcherConfig,

    /// Synthetic load settings (CLI `run`)
    #[serde(default)]
    pub load: LoadConfig,

    /// Logging and metrics export
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

/// What workers do with queued items when the dispatcher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Finish every item already queued, then exit
    #[default]
    Drain,
    /// Exit without running queued items; each one is reported as discarded
    Immediate,
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Name used for log and metric correlation
    pub name: String,

    /// Number of shards (queue + worker pairs), fixed for the dispatcher's lifetime
    pub shard_count: usize,

    /// Per-shard queue capacity; 0 means rendezvous handoff
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Shutdown behaviour for queued items
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,

    /// Upper bound on a single handler execution (None = unbounded)
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,
}

fn default_buffer_size() -> usize {
    256
}

impl DispatcherConfig {
    /// Create a config with default buffer size, drain policy and no timeout
    pub fn new(name: impl Into<String>, shard_count: usize) -> Self {
        Self {
            name: name.into(),
            shard_count,
            buffer_size: default_buffer_size(),
            shutdown_policy: ShutdownPolicy::default(),
            handler_timeout_ms: None,
        }
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

/// Synthetic load generator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Number of producer threads
    pub producers: usize,

    /// Items each producer submits
    pub items_per_producer: u64,

    /// Number of distinct keys cycled through by producers
    pub key_space: usize,

    /// Routing mode for every submission
    pub mode: RoutingMode,

    /// Simulated handler work per item
    pub handler_delay_ms: u64,

    /// Every n-th item returns an error (0 = never)
    pub fail_every: u64,

    /// Every n-th item panics (0 = never)
    pub panic_every: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            producers: 4,
            items_per_producer: 1000,
            key_space: 64,
            mode: RoutingMode::Hash,
            handler_delay_ms: 0,
            fail_every: 0,
            panic_every: 0,
        }
    }
}

/// Observability settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Log format: json / pretty / compact
    pub log_format: LogFormatSetting,

    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormatSetting::Pretty,
            metrics_port: None,
        }
    }
}

/// Log format as written in configuration files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    Json,
    #[default]
    Pretty,
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_defaults() {
        let config: DispatcherConfig = toml::from_str(
            r#"
name = "orders"
shard_count = 4
"#,
        )
        .unwrap();
        assert_eq!(config, DispatcherConfig::new("orders", 4));
        assert_eq!(config.buffer_size, 256);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
        assert_eq!(config.handler_timeout(), None);
    }

    #[test]
    fn test_app_config_sections_optional() {
        let config: AppConfig = toml::from_str(
            r#"
[dispatcher]
name = "orders"
shard_count = 2
shutdown_policy = "immediate"
handler_timeout_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(config.dispatcher.shutdown_policy, ShutdownPolicy::Immediate);
        assert_eq!(
            config.dispatcher.handler_timeout(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.load, LoadConfig::default());
        assert_eq!(config.observability.metrics_port, None);
    }

    #[test]
    fn test_negative_buffer_size_is_rejected() {
        let result: Result<DispatcherConfig, _> = toml::from_str(
            r#"
name = "orders"
shard_count = 2
buffer_size = -1
"#,
        );
        assert!(result.is_err());
    }
}
