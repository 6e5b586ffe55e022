//! Building transports for new sessions.

use crate::config::TransportConfig;
use async_trait::async_trait;
use designlink_discover::{Discovery, DiscoveryConfig};
use designlink_mcp::{
    LocalConfig, LocalTransport, McpError, McpResult, ProxyConfig, ProxyTransport, RemoteConfig,
    RemoteTransport, TokenProvider, Transport,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Creates the transport a new session will own.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Build an unconnected transport for `owner_id`.
    async fn create(&self, owner_id: &str, token: Option<&str>) -> McpResult<Box<dyn Transport>>;
}

/// Builds transports from configuration.
pub struct ConfiguredTransportFactory {
    transport: TransportConfig,
    discovery: DiscoveryConfig,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ConfiguredTransportFactory {
    pub fn new(transport: TransportConfig, discovery: DiscoveryConfig) -> Self {
        Self {
            transport,
            discovery,
            token_provider: None,
        }
    }

    /// Use `provider` for remote tokens and refresh after a 401.
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    async fn local_port(&self, configured: Option<u16>) -> McpResult<u16> {
        if let Some(port) = configured {
            return Ok(port);
        }

        let result = Discovery::new(self.discovery.clone()).discover().await;
        debug!(?result, "Discovery finished");
        result.port.ok_or_else(|| {
            McpError::connection_retryable(format!(
                "No local MCP endpoint found: {}",
                result.error.unwrap_or_else(|| "unknown reason".to_string())
            ))
        })
    }
}

#[async_trait]
impl TransportFactory for ConfiguredTransportFactory {
    async fn create(&self, owner_id: &str, token: Option<&str>) -> McpResult<Box<dyn Transport>> {
        match &self.transport {
            TransportConfig::Local {
                port,
                path,
                timeout_secs,
            } => {
                let port = self.local_port(*port).await?;
                info!(port, owner = %owner_id, "Using local MCP endpoint");
                let mut config = LocalConfig::new(port).with_path(path.clone());
                config.timeout_secs = *timeout_secs;
                Ok(Box::new(LocalTransport::new(config)?))
            }

            TransportConfig::Remote {
                url,
                token: configured,
                timeout_secs,
            } => {
                let mut config = RemoteConfig::new(url.clone());
                config.timeout_secs = *timeout_secs;
                if let Some(t) = token.or(configured.as_deref()).filter(|t| !t.is_empty()) {
                    config = config.with_token(t);
                }

                let mut transport = RemoteTransport::new(config)?;
                if let Some(provider) = &self.token_provider {
                    transport = transport.with_token_provider(provider.clone());
                }
                Ok(Box::new(transport))
            }

            TransportConfig::Proxy {
                base_url,
                timeout_secs,
            } => {
                let token = match token.filter(|t| !t.is_empty()) {
                    Some(t) => t.to_string(),
                    None => match &self.token_provider {
                        Some(provider) => provider.token().await?,
                        None => {
                            return Err(McpError::authentication(
                                "proxy transport requires a token",
                            ))
                        }
                    },
                };
                let mut config = ProxyConfig::new(base_url.clone(), owner_id, token);
                config.timeout_secs = *timeout_secs;
                Ok(Box::new(ProxyTransport::new(config)?))
            }
        }
    }
}
