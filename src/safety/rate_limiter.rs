use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::models::usage::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_hour(max_requests: u32) -> Self {
        RateLimitConfig {
            max_requests,
            window: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("window store unavailable: {0}")]
    Store(String),
}

/// Sliding-window admission control. `check_limit` is both the query and the
/// recorder in one atomic step; callers must never pair it with a separate
/// "record" call. On [`LimiterError`] callers fail open: quota enforcement
/// is a courtesy protection, not a billing mechanism.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Prunes entries older than the window, counts the remainder, and when
    /// below `max_requests` records the current attempt. Returns whether the
    /// attempt was admitted.
    async fn check_limit(
        &self,
        identifier: &str,
        action: ActionKind,
        config: RateLimitConfig,
    ) -> Result<bool, LimiterError>;

    /// Same pruning without recording; for telemetry only.
    async fn remaining_requests(
        &self,
        identifier: &str,
        action: ActionKind,
        config: RateLimitConfig,
    ) -> Result<u32, LimiterError>;
}

/// In-process implementation over a sharded map. The per-key entry guard
/// makes the prune/count/append sequence atomic per (identifier, action),
/// which keeps admission correct under concurrent runs for the same account.
pub struct InMemorySlidingWindow {
    windows: DashMap<String, Vec<u64>>,
}

impl InMemorySlidingWindow {
    pub fn new() -> Self {
        InMemorySlidingWindow {
            windows: DashMap::new(),
        }
    }

    fn key(identifier: &str, action: ActionKind) -> String {
        format!("{identifier}:{}", action.as_str())
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

impl Default for InMemorySlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for InMemorySlidingWindow {
    async fn check_limit(
        &self,
        identifier: &str,
        action: ActionKind,
        config: RateLimitConfig,
    ) -> Result<bool, LimiterError> {
        let now = Self::now_millis();
        let cutoff = now.saturating_sub(config.window.as_millis() as u64);

        let mut window = self
            .windows
            .entry(Self::key(identifier, action))
            .or_default();
        window.retain(|&ts| ts > cutoff);
        if window.len() as u32 >= config.max_requests {
            return Ok(false);
        }
        window.push(now);
        Ok(true)
    }

    async fn remaining_requests(
        &self,
        identifier: &str,
        action: ActionKind,
        config: RateLimitConfig,
    ) -> Result<u32, LimiterError> {
        let now = Self::now_millis();
        let cutoff = now.saturating_sub(config.window.as_millis() as u64);

        let mut window = self
            .windows
            .entry(Self::key(identifier, action))
            .or_default();
        window.retain(|&ts| ts > cutoff);
        Ok(config.max_requests.saturating_sub(window.len() as u32))
    }
}
