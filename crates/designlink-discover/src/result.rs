//! Discovery outcome.

use crate::error::DiscoverError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which layer produced a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    /// Operator-supplied override.
    Env,
    /// Windows registry.
    Registry,
    /// macOS preferences.
    Plist,
    /// The application's settings file.
    Settings,
    /// A listening socket owned by a matching process.
    PortScan,
    /// One of the well-known default ports.
    Default,
    NotFound,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryMethod::Env => "env",
            DiscoveryMethod::Registry => "registry",
            DiscoveryMethod::Plist => "plist",
            DiscoveryMethod::Settings => "settings",
            DiscoveryMethod::PortScan => "port-scan",
            DiscoveryMethod::Default => "default",
            DiscoveryMethod::NotFound => "not-found",
        };
        f.write_str(s)
    }
}

/// Result of a discovery run. Not cached; every run probes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub port: Option<u16>,
    pub method: DiscoveryMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiscoveryResult {
    pub fn found(port: u16, method: DiscoveryMethod) -> Self {
        Self {
            port: Some(port),
            method,
            error: None,
        }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self {
            port: None,
            method: DiscoveryMethod::NotFound,
            error: Some(error.into()),
        }
    }

    pub fn is_found(&self) -> bool {
        self.port.is_some()
    }

    /// The discovered port, or the recorded error.
    pub fn into_port(self) -> Result<u16, DiscoverError> {
        self.port.ok_or_else(|| {
            DiscoverError::NotFound(self.error.unwrap_or_else(|| "unknown reason".to_string()))
        })
    }
}
