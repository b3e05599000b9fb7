//! Rate Limit Configuration
//!
//! Ceilings and window sizing for command throttling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default sliding window (one minute)
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
/// Default commands per window for classes without an override
pub const DEFAULT_COMMAND_LIMIT: u32 = 20;
/// Default interval between background sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sliding window size in milliseconds
    pub window_ms: u64,

    /// Ceiling applied to command classes without an override
    pub default_limit: u32,

    /// Per command-class ceilings
    pub class_limits: HashMap<String, u32>,

    /// Background sweep interval in seconds
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let class_limits = [("broadcast", 5), ("register", 3), ("note", 10)]
            .into_iter()
            .map(|(class, limit)| (class.to_string(), limit))
            .collect();

        Self {
            window_ms: DEFAULT_WINDOW_MS,
            default_limit: DEFAULT_COMMAND_LIMIT,
            class_limits,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RateLimitConfig {
    /// Ceiling for a command class. Unknown classes get the default, never "unlimited".
    pub fn limit_for(&self, command_class: &str) -> u32 {
        self.class_limits
            .get(command_class)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Get window duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Get sweep duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Builder-style override for a single class
    pub fn with_class_limit(mut self, command_class: &str, limit: u32) -> Self {
        self.class_limits.insert(command_class.to_string(), limit);
        self
    }
}
