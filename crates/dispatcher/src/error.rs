//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
///
/// Only construction and lifecycle failures surface here. Handler failures
/// are delivered to observers, never returned to producers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid construction parameter
    #[error("invalid dispatcher config '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// Operation not allowed once the dispatcher has been stopped
    #[error("dispatcher '{name}' is stopped")]
    Stopped { name: String },

    /// Worker thread could not be spawned
    #[error("failed to spawn worker for shard {shard} of '{name}': {source}")]
    Spawn {
        name: String,
        shard: usize,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}
