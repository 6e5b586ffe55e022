//! JSON-RPC over HTTP POST, shared by the local and remote transports.
//!
//! Each request is a single POST; the reply is either a JSON object or an
//! SSE stream (see [`crate::sse`]). The channel tracks the `mcp-session-id`
//! header and echoes it on every later request.

use crate::error::{McpError, McpResult};
use crate::pending::PendingCalls;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, SESSION_HEADER};
use crate::sse::parse_response_body;
use designlink_util::Identifier;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Session affinity for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAffinity {
    pub id: String,
    /// True when the server did not issue an id and a placeholder was generated.
    /// Placeholders are tracked locally and never sent to the server.
    pub synthesized: bool,
}

/// Outcome of a single POST exchange.
#[derive(Debug)]
pub(crate) enum Exchange {
    Reply(JsonRpcResponse),
    /// The server answered 401.
    Unauthorized(String),
}

/// HTTP JSON-RPC channel.
pub(crate) struct HttpChannel {
    client: Client,
    url: String,
    request_timeout: Duration,
    session: RwLock<Option<SessionAffinity>>,
    pub(crate) pending: PendingCalls,
}

impl HttpChannel {
    pub(crate) fn new(url: impl Into<String>, request_timeout: Duration) -> McpResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                McpError::connection_fatal(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            url: url.into(),
            request_timeout,
            session: RwLock::new(None),
            pending: PendingCalls::new(),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) async fn session(&self) -> Option<SessionAffinity> {
        self.session.read().await.clone()
    }

    pub(crate) async fn clear_session(&self) {
        *self.session.write().await = None;
    }

    /// Use a placeholder id if the handshake left the connection without one.
    pub(crate) async fn ensure_session(&self) -> SessionAffinity {
        let mut session = self.session.write().await;
        if let Some(existing) = session.as_ref() {
            return existing.clone();
        }
        let placeholder = SessionAffinity {
            id: Identifier::local_session(),
            synthesized: true,
        };
        debug!(session_id = %placeholder.id, "Server issued no session id, using placeholder");
        *session = Some(placeholder.clone());
        placeholder
    }

    /// Build request with common headers.
    async fn build_request(&self, body: String, bearer: Option<&str>) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(body);

        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        if let Some(session) = self.session.read().await.as_ref() {
            if !session.synthesized {
                req = req.header(SESSION_HEADER, session.id.as_str());
            }
        }

        req
    }

    async fn capture_session(&self, response: &reqwest::Response) {
        let Some(value) = response.headers().get(SESSION_HEADER) else {
            return;
        };
        let Ok(id) = value.to_str() else {
            warn!("Ignoring non-ASCII session header");
            return;
        };

        let mut session = self.session.write().await;
        let changed = session.as_ref().map(|s| s.id != id).unwrap_or(true);
        if changed {
            debug!(session_id = %id, "Captured session id");
            *session = Some(SessionAffinity {
                id: id.to_string(),
                synthesized: false,
            });
        }
    }

    /// POST one request and read its reply, bounded by the request timeout.
    pub(crate) async fn exchange(
        &self,
        request: &JsonRpcRequest,
        bearer: Option<&str>,
    ) -> McpResult<Exchange> {
        let id = request.id.unwrap_or_default();
        match tokio::time::timeout(self.request_timeout, self.exchange_inner(request, bearer)).await
        {
            Ok(result) => result,
            Err(_) => Err(McpError::connection_retryable(format!(
                "Request {id} ({}) timed out after {}s",
                request.method,
                self.request_timeout.as_secs()
            ))),
        }
    }

    async fn exchange_inner(
        &self,
        request: &JsonRpcRequest,
        bearer: Option<&str>,
    ) -> McpResult<Exchange> {
        let body = serde_json::to_string(request)?;
        let id = request.id.unwrap_or_default();

        debug!(id, method = %request.method, url = %self.url, "Sending request");

        let response = self.build_request(body, bearer).await.send().await?;
        self.capture_session(&response).await;

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) if status.is_success() => return Err(e.into()),
            // The status alone decides the error.
            Err(_) => String::new(),
        };

        if status == StatusCode::UNAUTHORIZED {
            return Ok(Exchange::Unauthorized(text));
        }
        if !status.is_success() {
            return Err(McpError::from_status(status, &text));
        }

        parse_response_body(&text, id).map(Exchange::Reply)
    }

    /// Issue a request and return its `result`, without authentication retry.
    pub(crate) async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        bearer: Option<&str>,
    ) -> McpResult<Value> {
        let guard = self.pending.begin(method);
        let request = JsonRpcRequest::new(guard.id(), method, params);

        match self.exchange(&request, bearer).await? {
            Exchange::Reply(response) => into_result(method, response),
            Exchange::Unauthorized(body) => Err(McpError::from_status(
                StatusCode::UNAUTHORIZED,
                &body,
            )),
        }
    }

    /// Send a notification. The server's reply, if any, is ignored.
    pub(crate) async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
        bearer: Option<&str>,
    ) -> McpResult<()> {
        let notification = JsonRpcRequest::notification(method, params);
        let body = serde_json::to_string(&notification)?;

        debug!(method = %method, "Sending notification");

        let send = self.build_request(body, bearer).await.send();
        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| McpError::connection_retryable("Notification timed out"))??;

        if !response.status().is_success() {
            warn!(status = %response.status(), method = %method, "Notification returned non-success status");
        }

        Ok(())
    }
}

/// Extract the `result` of a response, turning an `error` member into a tool error.
pub(crate) fn into_result(method: &str, response: JsonRpcResponse) -> McpResult<Value> {
    if let Some(error) = response.error {
        return Err(McpError::tool(
            method,
            format!("{} (code {})", error.message, error.code),
        ));
    }

    response
        .result
        .ok_or_else(|| McpError::connection_fatal(format!("Missing {method} result")))
}
