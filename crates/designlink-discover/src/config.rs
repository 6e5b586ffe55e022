//! Discovery configuration.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Environment variable naming one or more override ports (`3845` or `3845,3846`).
pub const PORT_ENV_VAR: &str = "DESIGNLINK_MCP_PORT";

/// Ports the desktop application's MCP server listens on by default.
pub const DEFAULT_PORTS: &[u16] = &[3845];

/// Path the local MCP endpoint is served on.
pub const DEFAULT_PATH: &str = "/mcp";

/// Per-candidate verification timeout.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Discovery configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Raw override value, usually from [`PORT_ENV_VAR`].
    pub override_ports: Option<String>,
    /// Settings files to search for an embedded port.
    pub settings_paths: Vec<PathBuf>,
    /// Query the registry (Windows) or `defaults` (macOS).
    pub query_platform: bool,
    /// Scan listening sockets owned by processes with these names.
    pub process_names: Vec<String>,
    /// Well-known ports tried after the process scan.
    pub default_ports: Vec<u16>,
    pub host: String,
    pub path: String,
    pub verify_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            override_ports: None,
            settings_paths: default_settings_paths(),
            query_platform: true,
            process_names: vec!["figma".to_string()],
            default_ports: DEFAULT_PORTS.to_vec(),
            host: "127.0.0.1".to_string(),
            path: DEFAULT_PATH.to_string(),
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }
}

impl DiscoveryConfig {
    /// Platform defaults plus the override from the environment.
    pub fn from_env() -> Self {
        Self {
            override_ports: std::env::var(PORT_ENV_VAR)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            ..Self::default()
        }
    }

    /// A configuration that touches nothing on the host: no settings files,
    /// no OS commands, no default ports. Layers are opted into explicitly.
    pub fn isolated() -> Self {
        Self {
            override_ports: None,
            settings_paths: Vec::new(),
            query_platform: false,
            process_names: Vec::new(),
            default_ports: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_override(mut self, ports: impl Into<String>) -> Self {
        self.override_ports = Some(ports.into());
        self
    }

    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_paths.push(path.into());
        self
    }

    pub fn with_default_ports(mut self, ports: Vec<u16>) -> Self {
        self.default_ports = ports;
        self
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }
}

/// Parse a comma-separated port list, skipping invalid entries.
pub fn parse_port_list(raw: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.parse::<u16>() {
            Ok(port) if port > 0 => {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
            _ => warn!(entry = %entry, "Ignoring invalid override port"),
        }
    }
    ports
}

/// Where the desktop application keeps its settings on this OS.
pub fn default_settings_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("Library/Preferences/com.figma.Desktop.plist"));
            paths.push(home.join("Library/Application Support/Figma/settings.json"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(roaming) = dirs::config_dir() {
            paths.push(roaming.join("Figma").join("settings.json"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(config) = dirs::config_dir() {
            paths.push(config.join("Figma").join("settings.json"));
        }
    }

    paths
}
