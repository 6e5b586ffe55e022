//! Error types for the core crate.

use designlink_mcp::McpError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A transport operation failed.
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// No session with this id is registered.
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// The underlying transport error, if any.
    pub fn as_mcp(&self) -> Option<&McpError> {
        match self {
            CoreError::Mcp(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON syntax or shape.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },
}

/// Error returned by a circuit breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open and no fallback was supplied.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The wrapped operation (or fallback) failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The wrapped error, if the operation ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}
