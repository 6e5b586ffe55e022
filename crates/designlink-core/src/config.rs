//! Configuration loading and merging.
//!
//! Sources, later overriding earlier per top-level key:
//! 1. `~/.config/designlink/config.json`
//! 2. the `DESIGNLINK_CONFIG_CONTENT` environment variable
//! 3. `designlink.json` in the project directory
//!
//! `{env:VAR}` placeholders are substituted before parsing.

use crate::breaker::BreakerConfig;
use crate::error::{ConfigError, CoreResult};
use designlink_discover::{DiscoveryConfig, DEFAULT_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable holding inline configuration JSON.
pub const CONFIG_CONTENT_ENV_VAR: &str = "DESIGNLINK_CONFIG_CONTENT";

/// Project-level config file name.
pub const PROJECT_CONFIG_FILE: &str = "designlink.json";

static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{env:([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// JSON Schema reference.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// Which transport new sessions use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoverySettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker: Option<BreakerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<SessionConfig>,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for designlink_util::log::LogLevel {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::Debug,
            LogLevel::Info => Self::Info,
            LogLevel::Warn => Self::Warn,
            LogLevel::Error => Self::Error,
        }
    }
}

/// Transport selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// An endpoint on this machine. Discovery runs when `port` is unset.
    #[serde(rename_all = "camelCase")]
    Local {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default = "default_local_path")]
        path: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },

    /// A cloud endpoint with bearer auth.
    #[serde(rename_all = "camelCase")]
    Remote {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },

    /// An intermediary REST service.
    #[serde(rename_all = "camelCase")]
    Proxy {
        base_url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Local {
            port: None,
            path: default_local_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_local_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Discovery overrides. Unset fields keep the platform defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoverySettings {
    /// Port or comma-separated ports tried before any OS lookup.
    /// `DESIGNLINK_MCP_PORT` takes precedence when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_ports: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ports: Option<Vec<u16>>,
    /// Extra settings files searched for an embedded port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_paths: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_timeout_ms: Option<u64>,
}

impl DiscoverySettings {
    /// Apply these settings on top of the environment-derived defaults.
    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        let mut config = DiscoveryConfig::from_env();
        if config.override_ports.is_none() {
            config.override_ports = self.override_ports.clone();
        }
        if let Some(names) = &self.process_names {
            config.process_names = names.clone();
        }
        if let Some(ports) = &self.default_ports {
            config.default_ports = ports.clone();
        }
        if let Some(paths) = &self.settings_paths {
            config.settings_paths.extend(paths.iter().cloned());
        }
        if let Some(ms) = self.verify_timeout_ms {
            config.verify_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Sessions unused for longer than this are swept.
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Returns the merged config and the files it came from.
    pub async fn load(project_dir: Option<&Path>) -> CoreResult<(Self, Vec<PathBuf>)> {
        let mut config = Config::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = Self::global_config_dir() {
            let path = global_dir.join("config.json");
            if path.exists() {
                config = config.merge(Self::load_file(&path).await?);
                sources.push(path);
            }
        }

        if let Ok(content) = std::env::var(CONFIG_CONTENT_ENV_VAR) {
            let content = Self::substitute_variables(&content)?;
            config = config.merge(Self::parse(&content, "<env>")?);
        }

        if let Some(dir) = project_dir {
            let path = dir.join(PROJECT_CONFIG_FILE);
            if path.exists() {
                config = config.merge(Self::load_file(&path).await?);
                sources.push(path);
            }
        }

        config.validate()?;
        Ok((config, sources))
    }

    /// Get the global config directory (`~/.config/designlink` on Unix).
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                return Some(home.join(".config").join("designlink"));
            }
        }

        dirs::config_dir().map(|d| d.join("designlink"))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> CoreResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content)?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, source: &str) -> CoreResult<Self> {
        serde_json::from_str(content).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Replace `{env:VAR}` placeholders. A missing variable is an error.
    fn substitute_variables(content: &str) -> CoreResult<String> {
        let mut result = content.to_string();

        for cap in var_regex().captures_iter(content) {
            let (Some(full_match), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let value = std::env::var(name.as_str()).map_err(|_| ConfigError::EnvVarNotFound {
                name: name.as_str().to_string(),
            })?;
            result = result.replace(full_match.as_str(), &value);
        }

        Ok(result)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        self.schema = merge_option(self.schema, other.schema);
        self.log_level = merge_option(self.log_level, other.log_level);
        self.transport = merge_option(self.transport, other.transport);
        self.discovery = merge_option(self.discovery, other.discovery);
        self.breaker = merge_option(self.breaker, other.breaker);
        self.sessions = merge_option(self.sessions, other.sessions);
        self
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(breaker) = &self.breaker {
            if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
                return Err(invalid("breaker thresholds must be at least 1"));
            }
        }
        if let Some(sessions) = &self.sessions {
            if sessions.sweep_interval_secs == 0 {
                return Err(invalid("sessions.sweepIntervalSecs must be positive"));
            }
        }
        match &self.transport {
            Some(TransportConfig::Remote { url, .. }) if url.is_empty() => {
                Err(invalid("remote transport requires a url"))
            }
            Some(TransportConfig::Proxy { base_url, .. }) if base_url.is_empty() => {
                Err(invalid("proxy transport requires a baseUrl"))
            }
            _ => Ok(()),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        self.transport.clone().unwrap_or_default()
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        self.breaker.clone().unwrap_or_default()
    }

    pub fn session_config(&self) -> SessionConfig {
        self.sessions.clone().unwrap_or_default()
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        self.discovery.clone().unwrap_or_default().to_discovery_config()
    }
}

fn invalid(message: &str) -> crate::error::CoreError {
    ConfigError::Validation {
        message: message.to_string(),
    }
    .into()
}

fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_parse_transport_variants() {
        let config = Config::parse(
            r#"{"transport": {"type": "remote", "url": "https://mcp.example.com/mcp", "timeoutSecs": 30}}"#,
            "test",
        )
        .unwrap();
        assert_eq!(
            config.transport,
            Some(TransportConfig::Remote {
                url: "https://mcp.example.com/mcp".to_string(),
                token: None,
                timeout_secs: 30,
            })
        );

        let config = Config::parse(r#"{"transport": {"type": "local"}}"#, "test").unwrap();
        assert_eq!(config.transport_config(), TransportConfig::default());

        let config = Config::parse(
            r#"{"transport": {"type": "proxy", "baseUrl": "https://proxy.example.com"}}"#,
            "test",
        )
        .unwrap();
        assert!(matches!(
            config.transport_config(),
            TransportConfig::Proxy { timeout_secs: 60, .. }
        ));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = Config::parse("{not json", "bad.json").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Config(ConfigError::InvalidJson { ref path, .. }) if path == "bad.json"
        ));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.breaker_config(), BreakerConfig::default());
        assert_eq!(config.session_config().idle_timeout(), Duration::from_secs(86_400));
        assert_eq!(config.session_config().sweep_interval(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_merge_config() {
        let base = Config {
            log_level: Some(LogLevel::Info),
            breaker: Some(BreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            }),
            ..Default::default()
        };
        let other = Config {
            log_level: Some(LogLevel::Debug),
            sessions: Some(SessionConfig {
                idle_timeout_secs: 60,
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.log_level, Some(LogLevel::Debug));
        assert_eq!(merged.breaker_config().failure_threshold, 2);
        assert_eq!(merged.session_config().idle_timeout_secs, 60);
    }

    #[test]
    fn test_substitute_env_variables() {
        std::env::set_var("DESIGNLINK_TEST_REMOTE_TOKEN", "tok_abc");
        let content = r#"{"transport": {"type": "remote", "url": "https://x", "token": "{env:DESIGNLINK_TEST_REMOTE_TOKEN}"}}"#;
        let substituted = Config::substitute_variables(content).unwrap();
        assert!(substituted.contains("\"tok_abc\""));

        let missing = Config::substitute_variables("{env:DESIGNLINK_TEST_SURELY_UNSET_VAR}");
        assert!(matches!(
            missing,
            Err(CoreError::Config(ConfigError::EnvVarNotFound { .. }))
        ));
    }

    #[test]
    fn test_validate() {
        let config = Config {
            transport: Some(TransportConfig::Remote {
                url: String::new(),
                token: None,
                timeout_secs: 5,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            breaker: Some(BreakerConfig {
                success_threshold: 0,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_discovery_settings_apply() {
        let settings = DiscoverySettings {
            process_names: Some(vec!["FigmaAgent".to_string()]),
            default_ports: Some(vec![3845, 3846]),
            verify_timeout_ms: Some(500),
            ..Default::default()
        };
        let config = settings.to_discovery_config();
        assert_eq!(config.process_names, vec!["FigmaAgent".to_string()]);
        assert_eq!(config.default_ports, vec![3845, 3846]);
        assert_eq!(config.verify_timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        tokio::fs::write(
            &path,
            r#"{"logLevel": "warn", "sessions": {"idleTimeoutSecs": 120, "sweepIntervalSecs": 10}}"#,
        )
        .await
        .unwrap();

        let config = Config::load_file(&path).await.unwrap();
        assert_eq!(config.log_level, Some(LogLevel::Warn));
        assert_eq!(config.session_config().sweep_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_serialize_round_trip_keeps_camel_case() {
        let config = Config {
            transport: Some(TransportConfig::Proxy {
                base_url: "https://proxy.example.com".to_string(),
                timeout_secs: 15,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["transport"]["type"], "proxy");
        assert_eq!(json["transport"]["baseUrl"], "https://proxy.example.com");
        assert!(json.get("breaker").is_none());
    }
}
