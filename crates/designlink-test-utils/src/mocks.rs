//! Mock implementations for testing.

use async_trait::async_trait;
use designlink_mcp::{
    ConnectionState, InitializeParams, InitializeResult, ListToolsResult, McpError, McpResult,
    McpTool, TokenProvider, ToolCallResult, Transport, TransportKind,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An in-memory transport.
///
/// Clones share state, so a test can keep one handle while a session owns
/// another and still observe connects, calls and disconnects.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

struct MockInner {
    kind: TransportKind,
    state: Mutex<ConnectionState>,
    connect_error: Mutex<Option<McpError>>,
    tools: Mutex<Vec<McpTool>>,
    results: Mutex<HashMap<String, McpResult<ToolCallResult>>>,
    calls: Mutex<Vec<(String, Value)>>,
    disconnect_delay: Mutex<Option<Duration>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_kind(TransportKind::Local)
    }

    pub fn with_kind(kind: TransportKind) -> Self {
        Self {
            inner: Arc::new(MockInner {
                kind,
                state: Mutex::new(ConnectionState::Disconnected),
                connect_error: Mutex::new(None),
                tools: Mutex::new(Vec::new()),
                results: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                disconnect_delay: Mutex::new(None),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            }),
        }
    }

    /// Make `connect()` fail with `error`.
    pub fn failing_connect(self, error: McpError) -> Self {
        *self.inner.connect_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_tool(self, name: &str) -> Self {
        self.inner.tools.lock().unwrap().push(McpTool {
            name: name.to_string(),
            description: None,
            input_schema: None,
        });
        self
    }

    /// Configure the outcome of calling `name`.
    pub fn with_tool_result(self, name: &str, result: McpResult<ToolCallResult>) -> Self {
        self.inner
            .results
            .lock()
            .unwrap()
            .insert(name.to_string(), result);
        self
    }

    /// Make `disconnect()` take `delay` before it completes.
    pub fn with_disconnect_delay(self, delay: Duration) -> Self {
        *self.inner.disconnect_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Recorded `(tool, arguments)` pairs.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock().unwrap() = state;
    }

    fn require_connected(&self) -> McpResult<()> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(McpError::connection_fatal("mock transport is not connected"))
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    async fn session_id(&self) -> Option<String> {
        (self.state() == ConnectionState::Connected).then(|| "mock-session".to_string())
    }

    async fn connect(&self) -> McpResult<bool> {
        if self.state() == ConnectionState::Connected {
            return Ok(false);
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting);

        let error = self.inner.connect_error.lock().unwrap().clone();
        match error {
            Some(e) => {
                self.set_state(ConnectionState::Error);
                Err(e)
            }
            None => {
                self.set_state(ConnectionState::Connected);
                Ok(true)
            }
        }
    }

    async fn initialize(&self, params: InitializeParams) -> McpResult<InitializeResult> {
        Ok(InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: Default::default(),
            server_info: None,
        })
    }

    async fn list_tools(&self) -> McpResult<ListToolsResult> {
        self.require_connected()?;
        Ok(ListToolsResult {
            tools: self.inner.tools.lock().unwrap().clone(),
        })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        self.require_connected()?;
        self.inner
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        match self.inner.results.lock().unwrap().get(name) {
            Some(result) => result.clone(),
            None => Err(McpError::tool(name, "no mock result configured")),
        }
    }

    async fn disconnect(&self) -> McpResult<()> {
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.inner.disconnect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }
}

/// A token provider that hands out a scripted sequence of tokens.
///
/// Once the script runs out the last token is repeated.
#[derive(Clone)]
pub struct MockTokenProvider {
    tokens: Arc<Mutex<VecDeque<McpResult<String>>>>,
    last: Arc<Mutex<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockTokenProvider {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Arc::new(Mutex::new(
                tokens.into_iter().map(|t| Ok(t.into())).collect(),
            )),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a failure as the next response.
    pub fn then_fail(self, error: McpError) -> Self {
        self.tokens.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<dyn TokenProvider> {
        Arc::new(self)
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn token(&self) -> McpResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.tokens.lock().unwrap().pop_front();
        match next {
            Some(Ok(token)) => {
                *self.last.lock().unwrap() = Some(token.clone());
                Ok(token)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| McpError::authentication("mock provider has no tokens")),
        }
    }
}
