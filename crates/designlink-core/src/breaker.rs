//! Per-operation circuit breakers.
//!
//! ```text
//!            failures >= failure_threshold
//!   CLOSED ─────────────────────────────────▶ OPEN
//!     ▲                                        │
//!     │ successes >= success_threshold         │ next call after reset_timeout
//!     │                                        ▼
//!     └───────────────────────────────── HALF_OPEN
//!                 any failure: back to OPEN
//! ```
//!
//! Every execution is also recorded in a ring buffer of the last
//! [`HISTORY_CAPACITY`] runs for rolling statistics.

use crate::error::BreakerError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Executions kept for rolling statistics.
pub const HISTORY_CAPACITY: usize = 100;

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BreakerConfig {
    /// Consecutive failures in CLOSED that trip the breaker.
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN that close it again.
    pub success_threshold: u32,
    /// How long the breaker stays OPEN before admitting a trial call.
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Execution {
    success: bool,
    latency: Duration,
}

#[derive(Debug)]
struct Record {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    next_attempt_at: Option<Instant>,
    total_executions: u64,
    history: VecDeque<Execution>,
}

impl Record {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            next_attempt_at: None,
            total_executions: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    fn push(&mut self, execution: Execution) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(execution);
        self.total_executions += 1;
    }
}

/// Snapshot of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Executions since the breaker was created.
    pub total_executions: u64,
    /// Share of successful runs in the recent history, `1.0` when empty.
    pub success_rate: f64,
    #[serde(rename = "averageLatencyMs", serialize_with = "serialize_millis")]
    pub average_latency: Duration,
    /// When an OPEN breaker will admit its next trial call.
    pub next_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// A circuit breaker guarding one named operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    record: Mutex<Record>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            record: Mutex::new(Record::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. An expired OPEN breaker still reports OPEN until the
    /// next call moves it to HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decide whether a call may run, moving OPEN to HALF_OPEN once the
    /// reset timeout has passed.
    fn admit(&self) -> bool {
        let mut record = self.lock();
        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let due = record
                    .next_attempt_at
                    .map_or(true, |at| Instant::now() >= at);
                if due {
                    record.state = CircuitState::HalfOpen;
                    record.success_count = 0;
                    info!(breaker = %self.name, "Circuit breaker half-open");
                }
                due
            }
        }
    }

    fn on_success(&self, latency: Duration) {
        let mut record = self.lock();
        record.push(Execution {
            success: true,
            latency,
        });

        match record.state {
            CircuitState::Closed => record.failure_count = 0,
            CircuitState::HalfOpen => {
                record.success_count += 1;
                if record.success_count >= self.config.success_threshold {
                    record.state = CircuitState::Closed;
                    record.failure_count = 0;
                    record.success_count = 0;
                    record.next_attempt_at = None;
                    info!(breaker = %self.name, "Circuit breaker closed");
                }
            }
            // A call admitted before another task tripped the breaker.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, latency: Duration) {
        let mut record = self.lock();
        record.push(Execution {
            success: false,
            latency,
        });

        match record.state {
            CircuitState::Closed => {
                record.failure_count += 1;
                if record.failure_count >= self.config.failure_threshold {
                    self.trip(&mut record);
                }
            }
            CircuitState::HalfOpen => {
                record.failure_count += 1;
                self.trip(&mut record);
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, record: &mut Record) {
        record.state = CircuitState::Open;
        record.success_count = 0;
        record.next_attempt_at = Some(Instant::now() + self.config.reset_timeout());
        warn!(
            breaker = %self.name,
            failures = record.failure_count,
            reset_timeout_ms = self.config.reset_timeout_ms,
            "Circuit breaker opened"
        );
    }

    /// Run `op` unless the breaker is open.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            debug!(breaker = %self.name, "Rejected call, breaker open");
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        }
        self.run(op).await.map_err(BreakerError::Inner)
    }

    /// Run `op`, or `fallback` instead when the breaker is open.
    ///
    /// The fallback's outcome is not recorded.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        op: F,
        fallback: G,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            debug!(breaker = %self.name, "Breaker open, using fallback");
            return fallback().await.map_err(BreakerError::Inner);
        }
        self.run(op).await.map_err(BreakerError::Inner)
    }

    async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = op().await;
        let latency = started.elapsed();
        match &result {
            Ok(_) => self.on_success(latency),
            Err(_) => self.on_failure(latency),
        }
        result
    }

    pub fn stats(&self) -> BreakerStats {
        let record = self.lock();

        let runs = record.history.len();
        let successes = record.history.iter().filter(|e| e.success).count();
        let success_rate = if runs == 0 {
            1.0
        } else {
            successes as f64 / runs as f64
        };
        let average_latency = if runs == 0 {
            Duration::ZERO
        } else {
            record.history.iter().map(|e| e.latency).sum::<Duration>() / runs as u32
        };

        let next_attempt_at = match (record.state, record.next_attempt_at) {
            (CircuitState::Open, Some(at)) => {
                let remaining = at.saturating_duration_since(Instant::now());
                chrono::Duration::from_std(remaining)
                    .ok()
                    .map(|d| chrono::Utc::now() + d)
            }
            _ => None,
        };

        BreakerStats {
            name: self.name.clone(),
            state: record.state,
            failure_count: record.failure_count,
            success_count: record.success_count,
            total_executions: record.total_executions,
            success_rate,
            average_latency,
            next_attempt_at,
        }
    }

    /// Return to CLOSED with zeroed counters. History is kept.
    pub fn reset(&self) {
        let mut record = self.lock();
        record.state = CircuitState::Closed;
        record.failure_count = 0;
        record.success_count = 0;
        record.next_attempt_at = None;
        debug!(breaker = %self.name, "Circuit breaker reset");
    }
}

/// Process-wide set of breakers keyed by operation name.
///
/// Breakers are created on first use and live as long as the registry.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The breaker for `name`, created with the registry config if absent.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.read().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.read().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn execute<T, E, F, Fut>(&self, name: &str, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get(name).execute(op).await
    }

    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        name: &str,
        op: F,
        fallback: G,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        self.get(name).execute_with_fallback(op, fallback).await
    }

    pub fn stats(&self, name: &str) -> Option<BreakerStats> {
        self.read().get(name).map(|b| b.stats())
    }

    /// Stats for every breaker, ordered by name.
    pub fn all_stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<_> = self.read().values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset one breaker. Returns `false` if it was never used.
    pub fn reset(&self, name: &str) -> bool {
        match self.read().get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.read().values() {
            breaker.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout_ms: 1_000,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        breaker.execute(|| async { Ok::<_, &'static str>(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_after_threshold() {
        let breaker = CircuitBreaker::new("get_design_data", config());

        for _ in 0..4 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner("boom"))));
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;
        assert!(result.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count_in_closed() {
        let breaker = CircuitBreaker::new("op", config());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.stats().failure_count, 0);

        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_recovers_to_closed() {
        let breaker = CircuitBreaker::new("op", config());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(succeed(&breaker).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.stats().success_count, 1);

        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 0);
        assert!(stats.next_attempt_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("op", config());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.stats().next_attempt_at.is_some());
        assert!(succeed(&breaker).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_used_only_when_open() {
        let breaker = CircuitBreaker::new("op", config());

        let value = breaker
            .execute_with_fallback(|| async { Ok::<_, &'static str>(1) }, || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(value, 1);

        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        let value = breaker
            .execute_with_fallback(|| async { Ok::<_, &'static str>(1) }, || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(value, 2);

        let err = breaker
            .execute_with_fallback(
                || async { Ok::<u32, &'static str>(1) },
                || async { Err("fallback failed") },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::Inner("fallback failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let breaker = CircuitBreaker::new(
            "op",
            BreakerConfig {
                failure_threshold: 1_000,
                ..config()
            },
        );
        for i in 0..150 {
            if i % 2 == 0 {
                succeed(&breaker).await.unwrap();
            } else {
                let _ = fail(&breaker).await;
            }
        }

        let stats = breaker.stats();
        assert_eq!(stats.total_executions, 150);
        assert_eq!(breaker.lock().history.len(), HISTORY_CAPACITY);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_average_latency() {
        let breaker = CircuitBreaker::new("op", config());
        breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, &'static str>(())
            })
            .await
            .unwrap();
        breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok::<_, &'static str>(())
            })
            .await
            .unwrap();

        assert_eq!(breaker.stats().average_latency, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let breaker = CircuitBreaker::new("op", config());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        breaker.reset();
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.total_executions, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_keys_by_name() {
        let registry = CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..config()
        });
        assert!(registry.is_empty());

        let _ = registry
            .execute("get_design_data", || async { Err::<(), _>("boom") })
            .await;
        registry
            .execute("get_screenshot", || async { Ok::<_, &'static str>(()) })
            .await
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.stats("get_design_data").unwrap().state,
            CircuitState::Open
        );
        assert_eq!(
            registry.stats("get_screenshot").unwrap().state,
            CircuitState::Closed
        );
        assert!(registry.stats("unknown").is_none());

        let names: Vec<_> = registry.all_stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["get_design_data", "get_screenshot"]);

        assert!(registry.reset("get_design_data"));
        assert!(!registry.reset("unknown"));
        assert_eq!(
            registry.stats("get_design_data").unwrap().state,
            CircuitState::Closed
        );
        assert!(Arc::ptr_eq(
            &registry.get("get_design_data"),
            &registry.get("get_design_data")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_reset_all() {
        let registry = CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..config()
        });
        for name in ["a", "b"] {
            let _ = registry.execute(name, || async { Err::<(), _>("boom") }).await;
        }
        registry.reset_all();
        assert!(registry
            .all_stats()
            .iter()
            .all(|s| s.state == CircuitState::Closed));
    }

    #[test]
    fn test_stats_serialization() {
        let breaker = CircuitBreaker::new("op", config());
        let json = serde_json::to_value(breaker.stats()).unwrap();
        assert_eq!(json["state"], "CLOSED");
        assert_eq!(json["successRate"], 1.0);
        assert_eq!(json["averageLatencyMs"], 0.0);
    }
}
