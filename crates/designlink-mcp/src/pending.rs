//! Correlation of in-flight requests.
//!
//! Every request gets the next id from a per-connection counter and an entry
//! in the pending table until it resolves. The entry is owned by a
//! [`PendingGuard`]; dropping the guard (because the call resolved, timed
//! out, or the caller abandoned the future) removes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A request that has been sent but not yet answered.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: u64,
    pub method: String,
    pub issued_at: Instant,
}

/// Per-connection id counter and pending-call table.
#[derive(Debug)]
pub struct PendingCalls {
    next_id: AtomicU64,
    calls: Arc<Mutex<HashMap<u64, PendingCall>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Allocate the next id and register a pending call for it.
    pub fn begin(&self, method: &str) -> PendingGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let call = PendingCall {
            id,
            method: method.to_string(),
            issued_at: Instant::now(),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.insert(id, call);
        }
        PendingGuard {
            id,
            calls: Arc::clone(&self.calls),
        }
    }

    /// Number of calls still waiting for a response.
    pub fn len(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the outstanding calls, oldest first.
    pub fn outstanding(&self) -> Vec<PendingCall> {
        let mut calls: Vec<PendingCall> = self
            .calls
            .lock()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        calls.sort_by_key(|c| c.id);
        calls
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its pending entry when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    id: u64,
    calls: Arc<Mutex<HashMap<u64, PendingCall>>>,
}

impl PendingGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.remove(&self.id);
        }
    }
}
