//! Direct HTTPS transport to a cloud MCP endpoint.
//!
//! Every request carries `Authorization: Bearer <token>`. On a 401 the
//! configured [`TokenProvider`] is asked for a new token; if it returns a
//! different one the same request is sent exactly once more. Anything else
//! ends in [`McpError::Authentication`].

use crate::channel::{into_result, Exchange, HttpChannel};
use crate::error::{McpError, McpResult};
use crate::protocol::{
    methods, CallToolParams, InitializeParams, InitializeResult, JsonRpcRequest, ListToolsResult,
    ToolCallResult,
};
use crate::token::TokenProvider;
use crate::transport::{
    decode_initialize, decode_tool_result, decode_tools, ConnectionState, StateCell, Transport,
    TransportKind,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Remote transport configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// The server URL (e.g., `https://mcp.example.com/mcp`)
    pub url: String,
    /// Static bearer token, used until a provider supplies a replacement
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout_secs: 60,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Transport for a remote, token-authenticated endpoint.
pub struct RemoteTransport {
    channel: HttpChannel,
    token: RwLock<Option<String>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    state: StateCell,
    handshake: Mutex<()>,
}

impl RemoteTransport {
    pub fn new(config: RemoteConfig) -> McpResult<Self> {
        url::Url::parse(&config.url)
            .map_err(|e| McpError::connection_fatal(format!("Invalid remote URL {}: {e}", config.url)))?;

        let channel = HttpChannel::new(config.url, Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            channel,
            token: RwLock::new(config.token),
            token_provider: None,
            state: StateCell::default(),
            handshake: Mutex::new(()),
        })
    }

    /// Attach a provider used for the initial token and for refresh after a 401.
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// The token that will be sent on the next request, if known.
    pub async fn current_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn bearer(&self) -> McpResult<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        let provider = self
            .token_provider
            .as_ref()
            .ok_or_else(|| McpError::authentication("No token or token provider configured"))?;
        let token = fetch_token(provider.as_ref()).await?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Send a request, refreshing the token at most once on 401.
    async fn rpc(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let guard = self.channel.pending.begin(method);
        let request = JsonRpcRequest::new(guard.id(), method, params);
        let token = self.bearer().await?;

        let body = match self.channel.exchange(&request, Some(&token)).await? {
            Exchange::Reply(response) => return into_result(method, response),
            Exchange::Unauthorized(body) => body,
        };

        let Some(provider) = self.token_provider.as_ref() else {
            return Err(McpError::authentication(format!(
                "Token rejected for {method}: {body}"
            )));
        };

        let refreshed = fetch_token(provider.as_ref()).await?;
        if refreshed == token {
            return Err(McpError::authentication(format!(
                "Token rejected for {method} and provider returned the same token"
            )));
        }

        info!(method = %method, "Token rejected, retrying once with refreshed token");
        *self.token.write().await = Some(refreshed.clone());

        match self.channel.exchange(&request, Some(&refreshed)).await? {
            Exchange::Reply(response) => into_result(method, response),
            Exchange::Unauthorized(body) => Err(McpError::authentication(format!(
                "Refreshed token rejected for {method}: {body}"
            ))),
        }
    }

    async fn run_handshake(&self) -> McpResult<()> {
        let init = self.initialize(InitializeParams::default()).await?;
        let session = self.channel.ensure_session().await;

        debug!(
            protocol_version = %init.protocol_version,
            session_id = %session.id,
            "Remote MCP endpoint initialized"
        );

        let token = self.bearer().await?;
        if let Err(e) = self
            .channel
            .notify(methods::INITIALIZED, None, Some(&token))
            .await
        {
            warn!(error = %e, "Initialized notification failed, continuing");
        }

        Ok(())
    }

    async fn ensure_ready(&self) -> McpResult<()> {
        if self.state.get() == ConnectionState::Connecting {
            let _wait = self.handshake.lock().await;
        }
        if self.state.get() != ConnectionState::Connected {
            return Err(McpError::connection_fatal(format!(
                "Remote transport to {} is not connected",
                self.channel.url()
            )));
        }
        Ok(())
    }
}

async fn fetch_token(provider: &dyn TokenProvider) -> McpResult<String> {
    match provider.token().await {
        Ok(token) if !token.is_empty() => Ok(token),
        Ok(_) => Err(McpError::authentication("Token provider returned an empty token")),
        Err(McpError::Authentication(message)) => Err(McpError::Authentication(message)),
        Err(e) => Err(McpError::authentication(format!("Token provider failed: {e}"))),
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Remote
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
        info!(url = %self.channel.url(), "Connecting to remote MCP endpoint");

        match self.run_handshake().await {
            Ok(()) => {
                self.state.set(ConnectionState::Connected);
                Ok(true)
            }
            Err(e) => {
                warn!(url = %self.channel.url(), error = %e, "Remote handshake failed");
                self.channel.clear_session().await;
                self.state.set(ConnectionState::Error);
                Err(e)
            }
        }
    }

    async fn initialize(&self, params: InitializeParams) -> McpResult<InitializeResult> {
        let value = self
            .rpc(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;
        decode_initialize(value)
    }

    async fn list_tools(&self) -> McpResult<ListToolsResult> {
        self.ensure_ready().await?;
        let value = self.rpc(methods::TOOLS_LIST, None).await?;
        decode_tools(value)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        self.ensure_ready().await?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let value = self
            .rpc(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
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
        debug!(url = %self.channel.url(), "Closed remote transport");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::token_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Provider that returns `tokens[n]` on the n-th call (last one repeats).
    fn sequence_provider(tokens: &'static [&'static str]) -> (Arc<dyn TokenProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = token_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let token = tokens[n.min(tokens.len() - 1)].to_string();
            async move { Ok(token) }
        });
        (provider, calls)
    }

    fn ok_tools(id: u64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0", "id": id, "result": {"tools": [{"name": "get_design_data"}]}
        }))
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RemoteTransport::new(RemoteConfig::new("not a url")).is_err());
    }

    #[tokio::test]
    async fn test_bearer_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer static-1"))
            .respond_with(ok_tools(1))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            RemoteTransport::new(RemoteConfig::new(server.uri()).with_token("static-1")).unwrap();
        let value = transport.rpc(methods::TOOLS_LIST, None).await.unwrap();
        assert_eq!(value["tools"][0]["name"], "get_design_data");
    }

    #[tokio::test]
    async fn test_401_refreshes_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer new"))
            .respond_with(ok_tools(1))
            .expect(1)
            .mount(&server)
            .await;

        let (provider, calls) = sequence_provider(&["new"]);
        let transport = RemoteTransport::new(RemoteConfig::new(server.uri()).with_token("old"))
            .unwrap()
            .with_token_provider(provider);

        let value = transport.rpc(methods::TOOLS_LIST, None).await.unwrap();
        assert_eq!(value["tools"][0]["name"], "get_design_data");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.current_token().await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_second_401_is_authentication_error_without_more_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let (provider, calls) = sequence_provider(&["new", "newer"]);
        let transport = RemoteTransport::new(RemoteConfig::new(server.uri()).with_token("old"))
            .unwrap()
            .with_token_provider(provider);

        let err = transport.rpc(methods::TOOLS_LIST, None).await.unwrap_err();
        assert!(matches!(err, McpError::Authentication(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_token_from_provider_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let (provider, _calls) = sequence_provider(&["same"]);
        let transport = RemoteTransport::new(RemoteConfig::new(server.uri()).with_token("same"))
            .unwrap()
            .with_token_provider(provider);

        let err = transport.rpc(methods::TOOLS_LIST, None).await.unwrap_err();
        assert!(matches!(err, McpError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_401_without_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            RemoteTransport::new(RemoteConfig::new(server.uri()).with_token("t")).unwrap();
        let err = transport.rpc(methods::TOOLS_LIST, None).await.unwrap_err();
        assert!(matches!(err, McpError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_initial_token_from_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer first"))
            .respond_with(ok_tools(1))
            .mount(&server)
            .await;

        let (provider, calls) = sequence_provider(&["first"]);
        let transport = RemoteTransport::new(RemoteConfig::new(server.uri()))
            .unwrap()
            .with_token_provider(provider);

        transport.rpc(methods::TOOLS_LIST, None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_credentials() {
        let transport = RemoteTransport::new(RemoteConfig::new("https://example.com/mcp")).unwrap();
        let err = transport.rpc(methods::TOOLS_LIST, None).await.unwrap_err();
        assert!(matches!(err, McpError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_connect_and_call_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "remote-1")
                    .set_body_json(serde_json::json!({
                        "jsonrpc": "2.0", "id": 1, "result": {"protocolVersion": "2024-11-05"}
                    })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"method": "notifications/initialized"}),
            ))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("mcp-session-id", "remote-1"))
            .and(body_partial_json(serde_json::json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"ok\"}]}}\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let transport =
            RemoteTransport::new(RemoteConfig::new(server.uri()).with_token("tok")).unwrap();
        assert!(transport.connect().await.unwrap());
        assert_eq!(transport.kind(), TransportKind::Remote);

        let result = transport
            .call_tool("get_design_data", serde_json::json!({"fileKey": "k"}))
            .await
            .unwrap();
        assert_eq!(result.text(), "ok");
    }
}
