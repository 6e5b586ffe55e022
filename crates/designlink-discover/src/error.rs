//! Error types for the discover crate.

use thiserror::Error;

/// Errors that can occur while probing for a local endpoint.
///
/// Discovery itself never fails; these surface only from helpers and from
/// [`crate::DiscoveryResult::into_port`].
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// An OS command used for probing could not be run.
    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No verified endpoint was found.
    #[error("No local MCP endpoint found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let error = DiscoverError::Command {
            command: "lsof".to_string(),
            message: "not installed".to_string(),
        };
        assert_eq!(error.to_string(), "Command 'lsof' failed: not installed");
    }

    #[test]
    fn test_not_found_error_display() {
        let error = DiscoverError::NotFound("tried 3 candidates".to_string());
        assert_eq!(
            error.to_string(),
            "No local MCP endpoint found: tried 3 candidates"
        );
    }
}
