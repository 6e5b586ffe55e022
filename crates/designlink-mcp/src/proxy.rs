//! Transport that delegates to an intermediary REST service.
//!
//! The proxy owns the real MCP connection. This side only knows three
//! endpoints:
//!
//! - `POST /start {ownerId, token}` -> `{sessionId}`
//! - `POST /run {sessionId, method, params}` -> `{result}`
//! - `POST /test {sessionId}` -> `{ok}` (best effort)

use crate::error::{McpError, McpResult};
use crate::protocol::{
    methods, CallToolParams, InitializeParams, InitializeResult, ListToolsResult, ToolCallResult,
};
use crate::transport::{
    decode_initialize, decode_tool_result, decode_tools, ConnectionState, StateCell, Transport,
    TransportKind,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Proxy transport configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base URL of the proxy service; endpoints are appended to it.
    pub base_url: String,
    pub owner_id: String,
    pub token: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Call `/test` after `/start`.
    pub test_connection: bool,
}

impl ProxyConfig {
    pub fn new(
        base_url: impl Into<String>,
        owner_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            owner_id: owner_id.into(),
            token: token.into(),
            timeout_secs: 60,
            test_connection: true,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    owner_id: &'a str,
    token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest<'a> {
    session_id: &'a str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RunResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TestRequest<'a> {
    session_id: &'a str,
}

#[derive(Deserialize)]
struct TestResponse {
    #[serde(default)]
    ok: bool,
}

/// Transport that talks to the proxy's REST façade.
pub struct ProxyTransport {
    config: ProxyConfig,
    client: Client,
    base: String,
    session_id: RwLock<Option<String>>,
    state: StateCell,
    /// Held while `/start` is in flight so concurrent connects and calls wait.
    handshake: Mutex<()>,
}

impl ProxyTransport {
    pub fn new(config: ProxyConfig) -> McpResult<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            McpError::connection_fatal(format!("Invalid proxy URL {}: {e}", config.base_url))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                McpError::connection_fatal(format!("Failed to create HTTP client: {e}"))
            })?;

        let base = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            config,
            client,
            base,
            session_id: RwLock::new(None),
            state: StateCell::default(),
            handshake: Mutex::new(()),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        name: &str,
        body: &B,
    ) -> McpResult<R> {
        let url = self.endpoint(name);
        debug!(url = %url, "Proxy request");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::from_status(status, &text));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            McpError::connection_fatal(format!("Invalid response from proxy {name}: {e}"))
        })
    }

    /// The proxy session id, waiting out a connect that is in flight.
    async fn require_session(&self) -> McpResult<String> {
        if self.state.get() == ConnectionState::Connecting {
            let _wait = self.handshake.lock().await;
        }
        self.session_id.read().await.clone().ok_or_else(|| {
            McpError::connection_fatal("Proxy transport has no session, call connect first")
        })
    }

    /// Run one MCP method through the proxy.
    async fn run(&self, method: &str, params: Value) -> McpResult<Value> {
        let session_id = self.require_session().await?;
        let response: RunResponse = self
            .post(
                "run",
                &RunRequest {
                    session_id: &session_id,
                    method,
                    params,
                },
            )
            .await?;

        if let Some(error) = response.error {
            let message = match &error {
                Value::String(s) => s.clone(),
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
                _ => error.to_string(),
            };
            return Err(McpError::tool(method, message));
        }

        response
            .result
            .ok_or_else(|| McpError::connection_fatal(format!("Proxy returned no result for {method}")))
    }

    async fn probe(&self, session_id: &str) {
        match self
            .post::<_, TestResponse>("test", &TestRequest { session_id })
            .await
        {
            Ok(TestResponse { ok: true }) => debug!("Proxy connectivity test passed"),
            Ok(_) => warn!("Proxy connectivity test reported not ok"),
            Err(e) => warn!(error = %e, "Proxy connectivity test failed, continuing"),
        }
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Proxy
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn connect(&self) -> McpResult<bool> {
        let _handshake = self.handshake.lock().await;
        if self.state.get() == ConnectionState::Connected {
            return Ok(false);
        }

        self.state.set(ConnectionState::Connecting);
        info!(proxy = %self.base, owner = %self.config.owner_id, "Starting proxy session");

        let started: McpResult<StartResponse> = self
            .post(
                "start",
                &StartRequest {
                    owner_id: &self.config.owner_id,
                    token: &self.config.token,
                },
            )
            .await;

        match started {
            Ok(StartResponse { session_id }) => {
                if self.config.test_connection {
                    self.probe(&session_id).await;
                }
                *self.session_id.write().await = Some(session_id);
                self.state.set(ConnectionState::Connected);
                Ok(true)
            }
            Err(e) => {
                warn!(proxy = %self.base, error = %e, "Failed to start proxy session");
                self.state.set(ConnectionState::Error);
                Err(e)
            }
        }
    }

    async fn initialize(&self, params: InitializeParams) -> McpResult<InitializeResult> {
        let value = self
            .run(methods::INITIALIZE, serde_json::to_value(&params)?)
            .await?;
        decode_initialize(value)
    }

    async fn list_tools(&self) -> McpResult<ListToolsResult> {
        let value = self.run(methods::TOOLS_LIST, serde_json::json!({})).await?;
        decode_tools(value)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let value = self
            .run(methods::TOOLS_CALL, serde_json::to_value(&params)?)
            .await
            .map_err(|e| match e {
                McpError::Tool { message, .. } => McpError::tool(name, message),
                other => other,
            })?;
        decode_tool_result(name, value)
    }

    async fn disconnect(&self) -> McpResult<()> {
        *self.session_id.write().await = None;
        self.state.set(ConnectionState::Disconnected);
        debug!(proxy = %self.base, "Discarded proxy session");
        Ok(())
    }
}
