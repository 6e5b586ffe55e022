//! Session management.
//!
//! A [`SessionManager`] owns every live [`Session`]; each session owns
//! exactly one connected transport. Sessions unused for longer than the
//! idle timeout are removed by a periodic sweep.

use crate::config::SessionConfig;
use crate::error::{CoreError, CoreResult};
use crate::factory::TransportFactory;
use chrono::{DateTime, Utc};
use designlink_mcp::{
    ConnectionState, ListToolsResult, McpResult, ToolCallResult, Transport, TransportKind,
};
use designlink_util::{Identifier, TimingGuard};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// A bound connection to the MCP service for one owner.
pub struct Session {
    id: String,
    owner_id: String,
    auth_token: Option<String>,
    transport: Box<dyn Transport>,
    created_at: DateTime<Utc>,
    last_used_at: Mutex<DateTime<Utc>>,
    /// Set once removal starts; a closing session is no longer handed out.
    closing: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("transport", &self.transport.kind())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(owner_id: &str, auth_token: Option<String>, transport: Box<dyn Transport>) -> Self {
        let now = Utc::now();
        Self {
            id: Identifier::session(),
            owner_id: owner_id.to_string(),
            auth_token,
            transport,
            created_at: now,
            last_used_at: Mutex::new(now),
            closing: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        *self.last_used_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the session as used now. Never moves the timestamp backwards.
    pub fn touch(&self) {
        let now = Utc::now();
        let mut last = self.last_used_at.lock().unwrap_or_else(|e| e.into_inner());
        if now > *last {
            *last = now;
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Claim the right to close this session. Only the first caller wins.
    fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::SeqCst)
    }

    pub async fn list_tools(&self) -> McpResult<ListToolsResult> {
        self.touch();
        self.transport.list_tools().await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolCallResult> {
        self.touch();
        let _timing = TimingGuard::tool_call(name);
        self.transport.call_tool(name, arguments).await
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            transport: self.transport.kind(),
            state: self.transport.state(),
            created_at: self.created_at,
            last_used_at: self.last_used_at(),
        }
    }
}

/// Listing entry for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub owner_id: String,
    pub transport: TransportKind,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Registry of live sessions.
pub struct SessionManager {
    factory: Arc<dyn TransportFactory>,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    sweeper: Mutex<Option<AbortHandle>>,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn TransportFactory>, config: SessionConfig) -> Self {
        Self {
            factory,
            config,
            sessions: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Build and connect a transport, then register a session around it.
    ///
    /// Nothing is stored when the connection fails.
    pub async fn create_session(
        &self,
        owner_id: &str,
        token: Option<String>,
    ) -> CoreResult<Arc<Session>> {
        let transport = self.factory.create(owner_id, token.as_deref()).await?;

        if let Err(e) = transport.connect().await {
            warn!(owner = %owner_id, error = %e, "Session connection failed");
            if let Err(close_err) = transport.disconnect().await {
                debug!(error = %close_err, "Cleanup after failed connect also failed");
            }
            return Err(e.into());
        }

        let session = Arc::new(Session::new(owner_id, token, transport));
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        info!(
            session = %session.id,
            owner = %owner_id,
            transport = %session.transport.kind(),
            "Session created"
        );
        Ok(session)
    }

    /// Look up a session and mark it used.
    pub async fn get_session(&self, id: &str) -> CoreResult<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .await
            .get(id)
            .filter(|s| !s.is_closing())
            .cloned()
            .ok_or_else(|| CoreError::SessionNotFound { id: id.to_string() })?;
        session.touch();
        Ok(session)
    }

    /// Close the session's transport, then forget the session.
    ///
    /// A session already being removed reports not found.
    pub async fn remove_session(&self, id: &str) -> CoreResult<()> {
        let session = self
            .sessions
            .read()
            .await
            .get(id)
            .filter(|s| s.begin_close())
            .cloned()
            .ok_or_else(|| CoreError::SessionNotFound { id: id.to_string() })?;

        close(&session).await;
        self.sessions.write().await.remove(id);
        info!(session = %id, "Session removed");
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Summaries of every session, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.summary())
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    /// Remove sessions idle for longer than the idle timeout.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`. Returns how many sessions
    /// were removed.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let idle = chrono::Duration::from_std(self.config.idle_timeout())
            .unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(idle).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let expired: Vec<Arc<Session>> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.last_used_at() < cutoff && s.begin_close())
            .cloned()
            .collect();

        for session in &expired {
            close(session).await;
            self.sessions.write().await.remove(&session.id);
            debug!(session = %session.id, owner = %session.owner_id, "Swept idle session");
        }
        if !expired.is_empty() {
            info!(removed = expired.len(), "Idle session sweep");
        }
        expired.len()
    }

    /// Start the periodic idle sweep.
    ///
    /// The task stops on [`shutdown`](Self::shutdown) or once the manager
    /// is dropped. Starting again replaces the previous task.
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval();
        let manager: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.sweep().await;
            }
        });

        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
        handle
    }

    /// Stop the sweeper and close every session.
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let sessions: Vec<Arc<Session>> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.begin_close())
            .cloned()
            .collect();
        for session in &sessions {
            close(session).await;
            self.sessions.write().await.remove(&session.id);
        }
        info!(closed = sessions.len(), "Session manager shut down");
    }
}

async fn close(session: &Session) {
    if let Err(e) = session.transport.disconnect().await {
        warn!(session = %session.id, error = %e, "Error closing session transport");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use designlink_mcp::McpError;
    use designlink_test_utils::{fixtures, MockTransport};
    use std::time::Duration;

    /// Hands out clones of one mock so tests can observe it.
    struct MockFactory {
        transport: MockTransport,
    }

    #[async_trait]
    impl TransportFactory for MockFactory {
        async fn create(
            &self,
            _owner_id: &str,
            _token: Option<&str>,
        ) -> McpResult<Box<dyn Transport>> {
            Ok(Box::new(self.transport.clone()))
        }
    }

    fn manager_with(transport: MockTransport, config: SessionConfig) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Arc::new(MockFactory { transport }),
            config,
        ))
    }

    fn manager(transport: MockTransport) -> Arc<SessionManager> {
        manager_with(transport, SessionConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let mock = MockTransport::new();
        let manager = manager(mock.clone());

        let session = manager
            .create_session("user-1", Some("tok".to_string()))
            .await
            .unwrap();
        assert!(session.id().starts_with("ses_"));
        assert_eq!(session.owner_id(), "user-1");
        assert_eq!(session.auth_token(), Some("tok"));
        assert_eq!(mock.connect_count(), 1);

        let fetched = manager.get_session(session.id()).await.unwrap();
        assert_eq!(fetched.id(), session.id());
        assert!(fetched.last_used_at() >= fetched.created_at());
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let manager = manager(MockTransport::new());
        let a = manager.create_session("user-1", None).await.unwrap();
        let b = manager.create_session("user-1", None).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(manager.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_failed_connect_stores_nothing() {
        let mock =
            MockTransport::new().failing_connect(McpError::connection_retryable("refused"));
        let manager = manager(mock);

        let err = manager.create_session("user-1", None).await.unwrap_err();
        assert!(matches!(err, CoreError::Mcp(McpError::Connection { .. })));
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_get_missing_session() {
        let manager = manager(MockTransport::new());
        let err = manager.get_session("ses_missing").await.unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_session_closes_transport() {
        let mock = MockTransport::new();
        let manager = manager(mock.clone());
        let session = manager.create_session("user-1", None).await.unwrap();

        manager.remove_session(session.id()).await.unwrap();
        assert_eq!(mock.disconnect_count(), 1);
        assert_eq!(manager.session_count().await, 0);
        assert!(manager.remove_session(session.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_removes_close_once() {
        let mock = MockTransport::new().with_disconnect_delay(Duration::from_millis(50));
        let manager = manager(mock.clone());
        let session = manager.create_session("user-1", None).await.unwrap();
        let id = session.id().to_string();

        let (first, second, lookup) = tokio::join!(
            manager.remove_session(&id),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                manager.remove_session(&id).await
            },
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                manager.get_session(&id).await
            },
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(CoreError::SessionNotFound { .. })));
        assert!(lookup.is_err());
        assert_eq!(mock.disconnect_count(), 1);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_closes_before_forgetting() {
        let mock = MockTransport::new().with_disconnect_delay(Duration::from_millis(50));
        let manager = manager(mock.clone());
        let session = manager.create_session("user-1", None).await.unwrap();
        let id = session.id().to_string();

        let later = Utc::now() + chrono::Duration::hours(25);
        let (removed, during) = tokio::join!(manager.sweep_at(later), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            (
                mock.disconnect_count(),
                manager.session_count().await,
                manager.get_session(&id).await.is_err(),
            )
        });

        // Mid-sweep: the transport is closing, the entry is still present
        // but no longer handed out.
        assert_eq!(during, (1, 1, true));
        assert_eq!(removed, 1);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_idle_sessions() {
        let mock = MockTransport::new();
        let manager = manager(mock.clone());
        let session = manager.create_session("user-1", None).await.unwrap();
        let id = session.id().to_string();
        drop(session);

        let now = Utc::now();
        assert_eq!(manager.sweep_at(now + chrono::Duration::hours(23)).await, 0);
        assert!(manager.get_session(&id).await.is_ok());

        assert_eq!(manager.sweep_at(Utc::now() + chrono::Duration::hours(25)).await, 1);
        assert!(manager.get_session(&id).await.is_err());
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_session_call_tool_touches() {
        let mock = MockTransport::new()
            .with_tool("get_design_data")
            .with_tool_result("get_design_data", Ok(fixtures::text_result("{\"name\":\"Frame\"}")));
        let manager = manager(mock.clone());
        let session = manager.create_session("user-1", None).await.unwrap();
        let before = session.last_used_at();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = session
            .call_tool("get_design_data", serde_json::json!({"fileKey": "abc", "nodeId": "1:2"}))
            .await
            .unwrap();
        assert!(result.text().contains("Frame"));
        assert!(session.last_used_at() > before);
        assert_eq!(session.list_tools().await.unwrap().tools.len(), 1);
        assert_eq!(mock.calls()[0].0, "get_design_data");
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let manager = manager(MockTransport::new());
        let a = manager.create_session("user-1", None).await.unwrap();
        let b = manager.create_session("user-2", None).await.unwrap();

        let summaries = manager.list_sessions().await;
        assert_eq!(summaries.len(), 2);
        let ids: Vec<_> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&a.id()) && ids.contains(&b.id()));
        assert!(summaries.iter().all(|s| s.state == ConnectionState::Connected));

        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert!(json.get("ownerId").is_some());
        assert_eq!(json["transport"], "local");
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let mock = MockTransport::new();
        let manager = manager(mock.clone());
        manager.create_session("user-1", None).await.unwrap();
        manager.create_session("user-2", None).await.unwrap();
        let sweeper = manager.start_sweeper();

        manager.shutdown().await;
        assert_eq!(manager.session_count().await, 0);
        assert_eq!(mock.disconnect_count(), 2);
        assert!(sweeper.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_periodically() {
        let manager = manager_with(
            MockTransport::new(),
            SessionConfig {
                idle_timeout_secs: 0,
                sweep_interval_secs: 60,
            },
        );
        let _sweeper = manager.start_sweeper();
        manager.create_session("user-1", None).await.unwrap();

        // chrono time is wall-clock; make the session strictly older than the cutoff.
        std::thread::sleep(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(manager.session_count().await, 0);

        manager.shutdown().await;
    }
}
