//! MCP error types.
//!
//! Everything that leaves this crate is one of three kinds: a connection
//! failure (optionally retryable), an authentication failure, or a failed
//! tool operation.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can occur during MCP operations.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    /// Transport or network failure.
    #[error("Connection failed: {message}")]
    Connection { message: String, retryable: bool },

    /// Credential missing, rejected, or refresh exhausted.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote operation itself failed.
    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },
}

impl McpError {
    /// Create a retryable connection error.
    pub fn connection_retryable(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a connection error that retrying will not fix.
    pub fn connection_fatal(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            retryable: false,
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a tool error for the named method or tool.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Map a non-2xx HTTP status to the matching error kind.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("Server returned {status}")
        } else {
            format!("Server returned {status}: {body}")
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Authentication(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                Self::connection_retryable(message)
            }
            s if s.is_server_error() => Self::connection_retryable(message),
            _ => Self::connection_fatal(message),
        }
    }

    /// Whether the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection {
                retryable: true,
                ..
            }
        )
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::connection_retryable(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, "")
        } else if err.is_decode() {
            Self::connection_fatal(format!("Invalid response body: {err}"))
        } else {
            Self::connection_retryable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::connection_fatal(format!("Invalid JSON: {err}"))
    }
}
