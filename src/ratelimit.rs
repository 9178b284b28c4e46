//! Sliding-window rate limiting for named action kinds.
//!
//! Windows are persisted through a pluggable [`WindowStore`] so limits hold
//! across restarts. The check-and-record is not atomic across processes:
//! two near-simultaneous checks can both read the same window and both pass.
//! The backing store exposes no transactional primitive, so this is an
//! accepted race.

use crate::db::RateLimitDb;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    AiCategorize,
    StatementUpload,
    /// Manual transaction entry. No server surface checks this yet: bulk
    /// CSV/statement imports are deliberately not gated per row, and the
    /// manual-add endpoint belongs to the client app. The rule is kept so
    /// both sides throttle the same action identically.
    TransactionAdd,
}

#[derive(Debug, Clone, Copy)]
pub struct LimitRule {
    pub max_requests: usize,
    pub window_ms: i64,
}

impl ActionKind {
    pub const fn rule(self) -> LimitRule {
        match self {
            ActionKind::AiCategorize => LimitRule {
                max_requests: 7,
                window_ms: 60_000,
            },
            ActionKind::StatementUpload => LimitRule {
                max_requests: 1,
                window_ms: 180_000,
            },
            ActionKind::TransactionAdd => LimitRule {
                max_requests: 30,
                window_ms: 60_000,
            },
        }
    }

    fn store_key(self) -> String {
        format!("rate_limit:{}", self)
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("too many {action} requests, try again in {wait_secs}s")]
    Exceeded { action: ActionKind, wait_secs: u64 },

    #[error("rate limit store failure: {0}")]
    Store(String),
}

/// Storage for request-timestamp windows, keyed by action.
pub trait WindowStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Vec<i64>, Box<dyn std::error::Error>>;
    fn store(&self, key: &str, stamps: &[i64]) -> Result<(), Box<dyn std::error::Error>>;
    fn clear(&self, key: &str) -> Result<(), Box<dyn std::error::Error>>;
}

impl WindowStore for RateLimitDb {
    fn load(&self, key: &str) -> Result<Vec<i64>, Box<dyn std::error::Error>> {
        Ok(self.get(key).unwrap_or_default())
    }

    fn store(&self, key: &str, stamps: &[i64]) -> Result<(), Box<dyn std::error::Error>> {
        self.put(key, stamps.to_vec())
    }

    fn clear(&self, key: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.remove(key)
    }
}

/// In-memory store, used by tests and available for ephemeral deployments.
#[derive(Clone, Default)]
pub struct MemoryWindowStore {
    windows: Arc<Mutex<HashMap<String, Vec<i64>>>>,
}

impl WindowStore for MemoryWindowStore {
    fn load(&self, key: &str) -> Result<Vec<i64>, Box<dyn std::error::Error>> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn store(&self, key: &str, stamps: &[i64]) -> Result<(), Box<dyn std::error::Error>> {
        self.windows
            .lock()
            .unwrap()
            .insert(key.to_string(), stamps.to_vec());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.windows.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    /// On storage failure: allow the action (availability) or refuse it
    /// (strictness). Callers pick per deployment.
    fail_open: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, fail_open: bool) -> Self {
        Self { store, fail_open }
    }

    /// Checks and records one request for `action`. Fails with
    /// [`RateLimitError::Exceeded`] carrying the wait time in seconds when
    /// the window is full.
    pub fn check_limit(&self, action: ActionKind) -> Result<(), RateLimitError> {
        self.check_limit_at(action, Utc::now().timestamp_millis())
    }

    pub fn check_limit_at(&self, action: ActionKind, now_ms: i64) -> Result<(), RateLimitError> {
        let rule = action.rule();
        let key = action.store_key();

        let stamps = match self.store.load(&key) {
            Ok(stamps) => stamps,
            Err(e) => return self.on_store_failure(action, e),
        };

        let mut window: Vec<i64> = stamps
            .into_iter()
            .filter(|t| now_ms - *t < rule.window_ms)
            .collect();

        if window.len() >= rule.max_requests {
            let oldest = window.iter().min().copied().unwrap_or(now_ms);
            let wait_ms = (oldest + rule.window_ms - now_ms).max(1);
            let wait_secs = ((wait_ms + 999) / 1000) as u64;
            debug!("Rate limit hit for {}: wait {}s", action, wait_secs);
            return Err(RateLimitError::Exceeded { action, wait_secs });
        }

        window.push(now_ms);
        if let Err(e) = self.store.store(&key, &window) {
            return self.on_store_failure(action, e);
        }

        Ok(())
    }

    pub fn reset_limit(&self, action: ActionKind) -> Result<(), RateLimitError> {
        self.store
            .clear(&action.store_key())
            .map_err(|e| RateLimitError::Store(e.to_string()))
    }

    fn on_store_failure(
        &self,
        action: ActionKind,
        e: Box<dyn std::error::Error>,
    ) -> Result<(), RateLimitError> {
        if self.fail_open {
            warn!("Rate limit store failed for {}, allowing action: {}", action, e);
            Ok(())
        } else {
            Err(RateLimitError::Store(e.to_string()))
        }
    }
}
