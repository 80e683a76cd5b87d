//! Per-connection rate limiting for relay events.
//!
//! Bounds how many chat messages and typing events a single connection
//! may push through the relay within a sliding window.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::chat::ConnectionId;

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum actions allowed in the time window.
    pub max_actions: u32,
    /// Time window for counting actions.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a new rate limit configuration.
    pub fn new(max_actions: u32, window_secs: u64) -> Self {
        Self {
            max_actions,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions: 10,
            window: Duration::from_secs(10),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Action is allowed.
    Allowed,
    /// Action is denied due to rate limit.
    Denied {
        /// Time until the rate limit resets.
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Check if the action is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// Action timestamps for a single key.
#[derive(Debug, Default)]
struct Actions {
    timestamps: Vec<Instant>,
}

impl Actions {
    fn cleanup(&mut self, window: Duration, now: Instant) {
        self.timestamps
            .retain(|&t| now.saturating_duration_since(t) < window);
    }

    fn oldest(&self) -> Option<Instant> {
        self.timestamps.iter().min().copied()
    }
}

/// Sliding-window rate limiter keyed by connection.
#[derive(Debug)]
pub struct ActionRateLimiter<K = ConnectionId> {
    config: RateLimitConfig,
    actions: RwLock<HashMap<K, Actions>>,
}

impl<K: Hash + Eq + Clone> ActionRateLimiter<K> {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            actions: RwLock::new(HashMap::new()),
        }
    }

    /// Check and record in one operation.
    ///
    /// Returns `Allowed` and records the action, or returns `Denied` without recording.
    pub fn check_and_record(&self, key: &K) -> RateLimitResult {
        let now = Instant::now();
        let mut actions = self.actions.write().unwrap_or_else(PoisonError::into_inner);
        let entry = actions.entry(key.clone()).or_default();
        entry.cleanup(self.config.window, now);

        if entry.timestamps.len() >= self.config.max_actions as usize {
            let retry_after = entry
                .oldest()
                .map(|oldest| self.config.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or(Duration::ZERO);
            return RateLimitResult::Denied { retry_after };
        }

        entry.timestamps.push(now);
        RateLimitResult::Allowed
    }

    /// Get the number of remaining actions for a key.
    pub fn remaining(&self, key: &K) -> u32 {
        let now = Instant::now();
        let actions = self.actions.read().unwrap_or_else(PoisonError::into_inner);

        match actions.get(key) {
            Some(entry) => {
                let count = entry
                    .timestamps
                    .iter()
                    .filter(|&&t| now.saturating_duration_since(t) < self.config.window)
                    .count();
                self.config.max_actions.saturating_sub(count as u32)
            }
            None => self.config.max_actions,
        }
    }

    /// Drop all state for a key, e.g. when its connection closes.
    pub fn forget(&self, key: &K) {
        self.actions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Cleanup old entries for all keys.
    ///
    /// Call this periodically to free memory.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut actions = self.actions.write().unwrap_or_else(PoisonError::into_inner);
        for entry in actions.values_mut() {
            entry.cleanup(self.config.window, now);
        }
        actions.retain(|_, entry| !entry.timestamps.is_empty());
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Rate limiters for the event kinds a connection can emit.
#[derive(Debug)]
pub struct RateLimiters {
    /// Rate limiter for chat messages.
    pub message: ActionRateLimiter,
    /// Rate limiter for typing events.
    pub typing: ActionRateLimiter,
}

impl RateLimiters {
    /// Create rate limiters with custom configurations.
    pub fn with_config(message: RateLimitConfig, typing: RateLimitConfig) -> Self {
        Self {
            message: ActionRateLimiter::new(message),
            typing: ActionRateLimiter::new(typing),
        }
    }

    /// Drop all state for a connection.
    pub fn forget(&self, connection_id: &ConnectionId) {
        self.message.forget(connection_id);
        self.typing.forget(connection_id);
    }

    /// Cleanup all rate limiters.
    pub fn cleanup(&self) {
        self.message.cleanup();
        self.typing.cleanup();
    }
}

impl Default for RateLimiters {
    /// Defaults: 20 messages and 60 typing events per 10 seconds.
    fn default() -> Self {
        Self::with_config(RateLimitConfig::new(20, 10), RateLimitConfig::new(60, 10))
    }
}
