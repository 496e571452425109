//! Layered error definitions
//!
//! Categorized by source: config / handler / general

use std::time::Duration;

use thiserror::Error;

/// Unified error type for configuration and I/O concerns
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single handler invocation.
///
/// Produced at the worker boundary and delivered to observers. It never
/// reaches the producer that submitted the item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler returned an error
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler panicked; the worker recovered and kept draining
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler overran the configured execution limit
    #[error("handler exceeded {limit:?}")]
    TimedOut { limit: Duration },
}

impl HandlerError {
    /// Create a returned-error failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation_display() {
        let err = ContractError::config_validation("dispatcher.shard_count", "must be > 0");
        assert_eq!(
            err.to_string(),
            "config validation error at 'dispatcher.shard_count': must be > 0"
        );
    }

    #[test]
    fn test_handler_error_kind() {
        assert_eq!(HandlerError::failed("x").kind(), "failed");
        assert_eq!(HandlerError::Panicked("boom".into()).kind(), "panicked");
        let timeout = HandlerError::TimedOut {
            limit: Duration::from_millis(5),
        };
        assert_eq!(timeout.kind(), "timed_out");
        assert!(timeout.to_string().contains("5ms"));
    }
}
