//! Sliding Window Rate Limiter
//!
//! Per (identity, command class) throttling. The limiter is advisory: it
//! keeps its state in process memory and forgets everything on restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::RateLimitConfig;
use super::window::RateWindow;
use crate::metrics;

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the caller must wait
    pub limited: bool,

    /// Seconds until a slot frees up (only when limited)
    pub time_left_secs: Option<u64>,

    /// Ceiling applied to this command class
    pub limit: u32,

    /// Events in the window after this check
    pub count: usize,
}

impl RateLimitResult {
    fn allowed(limit: u32, count: usize) -> Self {
        Self {
            limited: false,
            time_left_secs: None,
            limit,
            count,
        }
    }

    fn limited(limit: u32, count: usize, time_left_secs: u64) -> Self {
        Self {
            limited: true,
            time_left_secs: Some(time_left_secs),
            limit,
            count,
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct WindowKey {
    identity: String,
    command_class: String,
}

/// Sliding window rate limiter
///
/// Cheap to clone; clones share the same window map.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    windows: Arc<Mutex<HashMap<WindowKey, RateWindow>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with an empty window map
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check (and on success record) one command for `identity`
    pub fn check(&self, identity: &str, command_class: &str) -> RateLimitResult {
        self.check_at(identity, command_class, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading
    pub fn check_at(&self, identity: &str, command_class: &str, now: Instant) -> RateLimitResult {
        let limit = self.config.limit_for(command_class);
        let window = self.config.window();
        let key = WindowKey {
            identity: identity.to_string(),
            command_class: command_class.to_string(),
        };

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let entry = windows.entry(key).or_default();
        entry.prune(now, window);

        if entry.len() >= limit as usize {
            let time_left = entry.seconds_until_slot(now, window);
            let count = entry.len();
            drop(windows);

            metrics::RATE_LIMITED_TOTAL
                .with_label_values(&[command_class])
                .inc();
            warn!(
                identity,
                command_class, limit, time_left, "Rate limit reached"
            );
            return RateLimitResult::limited(limit, count, time_left);
        }

        entry.push(now);
        let count = entry.len();
        let tracked = windows.len();
        drop(windows);

        metrics::RATE_WINDOWS_ACTIVE.set(tracked as i64);
        RateLimitResult::allowed(limit, count)
    }

    /// Remove every key whose history has fully expired. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.config.window();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, entry| !entry.is_stale(now, window));
        let removed = before - windows.len();
        metrics::RATE_WINDOWS_ACTIVE.set(windows.len() as i64);
        removed
    }

    /// Number of tracked (identity, class) keys
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    ///
    /// Runs at `sweep_interval` regardless of traffic; abort the handle to stop it.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed, "Swept expired rate limit windows");
                }
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
