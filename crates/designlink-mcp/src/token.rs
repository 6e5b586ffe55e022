//! Bearer token sources for the remote transport.

use crate::error::McpResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Supplies bearer tokens, typically backed by an externally managed refresh.
///
/// The remote transport calls this once to obtain an initial token (when no
/// static token is configured) and again after a 401. Implementations may be
/// invoked concurrently by independent calls and must tolerate that.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> McpResult<String>;
}

/// A provider that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> McpResult<String> {
        Ok(self.0.clone())
    }
}

/// A provider backed by an async closure.
pub struct FnTokenProvider<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<String>> + Send,
{
    async fn token(&self) -> McpResult<String> {
        (self.f)().await
    }
}

/// Wrap an async closure as a shared token provider.
pub fn token_fn<F, Fut>(f: F) -> Arc<dyn TokenProvider>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<String>> + Send + 'static,
{
    Arc::new(FnTokenProvider { f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.token().await.unwrap(), "abc");
        assert_eq!(provider.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_fn_provider_called_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = token_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("token-{n}")) }
        });

        assert_eq!(provider.token().await.unwrap(), "token-0");
        assert_eq!(provider.token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
