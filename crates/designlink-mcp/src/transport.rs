//! The capability set shared by every MCP transport.

use crate::error::{McpError, McpResult};
use crate::protocol::{InitializeParams, InitializeResult, ListToolsResult, ToolCallResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::RwLock;

/// Which concrete transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// An endpoint already running on this machine.
    Local,
    /// A cloud endpoint reached directly over HTTPS.
    Remote,
    /// An intermediary REST service that owns the real connection.
    Proxy,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Local => write!(f, "local"),
            TransportKind::Remote => write!(f, "remote"),
            TransportKind::Proxy => write!(f, "proxy"),
        }
    }
}

/// Connection lifecycle of a transport.
///
/// Each connection attempt passes through `Connecting` before reaching
/// `Connected` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> TransportKind;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Session affinity token for this connection, if one is established.
    async fn session_id(&self) -> Option<String>;

    /// Establish the connection and run the protocol handshake.
    ///
    /// Returns `false` when the transport was already connected.
    async fn connect(&self) -> McpResult<bool>;

    /// Send the `initialize` request.
    async fn initialize(&self, params: InitializeParams) -> McpResult<InitializeResult>;

    /// List the tools the service offers.
    async fn list_tools(&self) -> McpResult<ListToolsResult>;

    /// Invoke a tool.
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult>;

    /// Close the connection.
    async fn disconnect(&self) -> McpResult<()>;
}

/// Interior-mutable holder for a [`ConnectionState`].
#[derive(Debug, Default)]
pub(crate) struct StateCell(RwLock<ConnectionState>);

impl StateCell {
    pub(crate) fn get(&self) -> ConnectionState {
        self.0.read().map(|s| *s).unwrap_or(ConnectionState::Error)
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        if let Ok(mut current) = self.0.write() {
            *current = state;
        }
    }
}

/// Decode a `tools/list` result payload.
pub(crate) fn decode_tools(value: Value) -> McpResult<ListToolsResult> {
    serde_json::from_value(value)
        .map_err(|e| McpError::connection_fatal(format!("Invalid tools/list result: {e}")))
}

/// Decode a `tools/call` result payload, surfacing `isError` as a tool error.
pub(crate) fn decode_tool_result(name: &str, value: Value) -> McpResult<ToolCallResult> {
    let result: ToolCallResult = serde_json::from_value(value)
        .map_err(|e| McpError::connection_fatal(format!("Invalid tools/call result: {e}")))?;

    if result.is_error {
        let message = result.text();
        return Err(McpError::tool(
            name,
            if message.is_empty() {
                "tool reported an error".to_string()
            } else {
                message
            },
        ));
    }

    Ok(result)
}

/// Decode an `initialize` result payload.
pub(crate) fn decode_initialize(value: Value) -> McpResult<InitializeResult> {
    serde_json::from_value(value)
        .map_err(|e| McpError::connection_fatal(format!("Invalid initialize result: {e}")))
}
