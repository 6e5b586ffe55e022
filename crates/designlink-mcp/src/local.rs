//! Transport for an MCP endpoint already listening on this machine.
//!
//! No credentials are sent. The handshake is `initialize`, session header
//! capture, the `notifications/initialized` notification, and optionally a
//! `tools/list` probe. Failures of the last two are logged and ignored.

use crate::channel::HttpChannel;
use crate::error::{McpError, McpResult};
use crate::protocol::{
    methods, CallToolParams, InitializeParams, InitializeResult, ListToolsResult, ToolCallResult,
};
use crate::transport::{
    decode_initialize, decode_tool_result, decode_tools, ConnectionState, StateCell, Transport,
    TransportKind,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default path the local endpoint serves MCP on.
pub const DEFAULT_LOCAL_PATH: &str = "/mcp";

/// Local transport configuration.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Issue a `tools/list` request after the handshake.
    pub probe_tools: bool,
}

impl LocalConfig {
    pub fn new(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            path: DEFAULT_LOCAL_PATH.to_string(),
            timeout_secs: 60,
            probe_tools: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

/// Transport for a local, unauthenticated endpoint.
pub struct LocalTransport {
    config: LocalConfig,
    channel: HttpChannel,
    state: StateCell,
    /// Held for the duration of a handshake so calls wait for `initialize`.
    handshake: Mutex<()>,
}

impl LocalTransport {
    pub fn new(config: LocalConfig) -> McpResult<Self> {
        let channel = HttpChannel::new(config.url(), Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            channel,
            state: StateCell::default(),
            handshake: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// Number of requests awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.channel.pending.len()
    }

    async fn run_handshake(&self) -> McpResult<()> {
        let init = self.initialize(InitializeParams::default()).await?;
        let session = self.channel.ensure_session().await;

        debug!(
            protocol_version = %init.protocol_version,
            server = ?init.server_info.as_ref().map(|s| s.name.as_str()),
            session_id = %session.id,
            "Local MCP endpoint initialized"
        );

        if let Err(e) = self.channel.notify(methods::INITIALIZED, None, None).await {
            warn!(error = %e, "Initialized notification failed, continuing");
        }

        if self.config.probe_tools {
            match self.fetch_tools().await {
                Ok(tools) => debug!(tool_count = tools.tools.len(), "Tool probe succeeded"),
                Err(e) => warn!(error = %e, "Tool probe failed, continuing"),
            }
        }

        Ok(())
    }

    async fn fetch_tools(&self) -> McpResult<ListToolsResult> {
        let value = self.channel.request(methods::TOOLS_LIST, None, None).await?;
        decode_tools(value)
    }

    async fn ensure_ready(&self) -> McpResult<()> {
        if self.state.get() == ConnectionState::Connecting {
            let _wait = self.handshake.lock().await;
        }
        if self.state.get() != ConnectionState::Connected {
            return Err(McpError::connection_fatal(format!(
                "Local transport to {} is not connected",
                self.channel.url()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn session_id(&self) -> Option<String> {
        self.channel.session().await.map(|s| s.id)
    }

    async fn connect(&self) -> McpResult<bool> {
        let _handshake = self.handshake.lock().await;
        if self.state.get() == ConnectionState::Connected {
            return Ok(false);
        }

        self.state.set(ConnectionState::Connecting);
        info!(url = %self.channel.url(), "Connecting to local MCP endpoint");

        match self.run_handshake().await {
            Ok(()) => {
                self.state.set(ConnectionState::Connected);
                Ok(true)
            }
            Err(e) => {
                warn!(url = %self.channel.url(), error = %e, "Local handshake failed");
                self.channel.clear_session().await;
                self.state.set(ConnectionState::Error);
                Err(e)
            }
        }
    }

    async fn initialize(&self, params: InitializeParams) -> McpResult<InitializeResult> {
        let value = self
            .channel
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?), None)
            .await?;
        decode_initialize(value)
    }

    async fn list_tools(&self) -> McpResult<ListToolsResult> {
        self.ensure_ready().await?;
        self.fetch_tools().await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        self.ensure_ready().await?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let value = self
            .channel
            .request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?), None)
            .await
            .map_err(|e| match e {
                McpError::Tool { message, .. } => McpError::tool(name, message),
                other => other,
            })?;

        decode_tool_result(name, value)
    }

    async fn disconnect(&self) -> McpResult<()> {
        self.channel.clear_session().await;
        self.state.set(ConnectionState::Disconnected);
        debug!(url = %self.channel.url(), "Closed local transport");
        Ok(())
    }
}
