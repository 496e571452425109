//! Configuration parsing
//!
//! TOML is the primary format; JSON is accepted for generated configs.

use contracts::{AppConfig, ContractError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<AppConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<AppConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse(content: &str, format: ConfigFormat) -> Result<AppConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RoutingMode, ShutdownPolicy};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[dispatcher]
name = "orders"
shard_count = 4
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.dispatcher.name, "orders");
        assert_eq!(config.dispatcher.shard_count, 4);
        assert_eq!(config.dispatcher.buffer_size, 256);
        assert_eq!(config.load.mode, RoutingMode::Hash);
    }

    #[test]
    fn test_parse_json_full() {
        let content = r#"{
            "dispatcher": {
                "name": "orders",
                "shard_count": 8,
                "buffer_size": 0,
                "shutdown_policy": "immediate",
                "handler_timeout_ms": 250
            },
            "load": { "producers": 2, "mode": "round_robin", "panic_every": 100 },
            "observability": { "log_format": "json", "metrics_port": 9000 }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.dispatcher.buffer_size, 0);
        assert_eq!(config.dispatcher.shutdown_policy, ShutdownPolicy::Immediate);
        assert_eq!(config.load.producers, 2);
        assert_eq!(config.load.mode, RoutingMode::RoundRobin);
        assert_eq!(config.load.items_per_producer, 1000);
        assert_eq!(config.observability.metrics_port, Some(9000));
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_parse_toml_missing_dispatcher() {
        let result = parse_toml("[load]\nproducers = 1\n");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
