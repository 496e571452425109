//! Configuration validation
//!
//! Rules:
//! - dispatcher.name non-empty
//! - dispatcher.shard_count > 0
//! - dispatcher.handler_timeout_ms > 0 when set
//! - load.producers, load.items_per_producer, load.key_space > 0
//! - observability.metrics_port != 0 when set

use contracts::{AppConfig, ContractError, DispatcherConfig, LoadConfig, ObservabilitySettings};

/// Validate an AppConfig
///
/// Returns the first error encountered.
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_dispatcher(&config.dispatcher)?;
    validate_load(&config.load)?;
    validate_observability(&config.observability)?;
    Ok(())
}

fn validate_dispatcher(dispatcher: &DispatcherConfig) -> Result<(), ContractError> {
    if dispatcher.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "dispatcher.name",
            "dispatcher name cannot be empty",
        ));
    }

    if dispatcher.shard_count == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.shard_count",
            "shard_count must be > 0",
        ));
    }

    if dispatcher.handler_timeout_ms == Some(0) {
        return Err(ContractError::config_validation(
            "dispatcher.handler_timeout_ms",
            "handler_timeout_ms must be > 0 (omit it for no timeout)",
        ));
    }

    Ok(())
}

fn validate_load(load: &LoadConfig) -> Result<(), ContractError> {
    if load.producers == 0 {
        return Err(ContractError::config_validation(
            "load.producers",
            "producers must be > 0",
        ));
    }

    if load.items_per_producer == 0 {
        return Err(ContractError::config_validation(
            "load.items_per_producer",
            "items_per_producer must be > 0",
        ));
    }

    if load.key_space == 0 {
        return Err(ContractError::config_validation(
            "load.key_space",
            "key_space must be > 0",
        ));
    }

    Ok(())
}

fn validate_observability(settings: &ObservabilitySettings) -> Result<(), ContractError> {
    if settings.metrics_port == Some(0) {
        return Err(ContractError::config_validation(
            "observability.metrics_port",
            "metrics_port must be a non-zero port",
        ));
    }
    Ok(())
}
