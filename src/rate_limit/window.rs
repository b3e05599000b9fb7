//! Sliding window of command timestamps for one (identity, command class) key.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Ordered event times inside the trailing window
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp with `now - t >= window`
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn push(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Whole seconds until the oldest retained event leaves the window, rounded up.
    pub fn seconds_until_slot(&self, now: Instant, window: Duration) -> u64 {
        match self.timestamps.front() {
            Some(oldest) => {
                let remaining = window.saturating_sub(now.saturating_duration_since(*oldest));
                let millis = remaining.as_millis() as u64;
                millis.div_ceil(1000).max(1)
            }
            None => 0,
        }
    }

    /// True once every retained timestamp is outside the window
    pub fn is_stale(&self, now: Instant, window: Duration) -> bool {
        self.timestamps
            .back()
            .map_or(true, |newest| now.saturating_duration_since(*newest) >= window)
    }
}
