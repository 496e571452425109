//! Error types for CLI operations.

use dispatcher::DispatchError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// A command-line override produced an invalid configuration
    #[error("Invalid override for {field}: {message}")]
    InvalidOverride { field: String, message: String },

    /// Dispatcher construction or start failed
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] DispatchError),

    /// A producer thread could not be joined
    #[error("Workload failed: {message}")]
    Workload { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_override(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn workload(message: impl Into<String>) -> Self {
        Self::Workload {
            message: message.into(),
        }
    }
}
