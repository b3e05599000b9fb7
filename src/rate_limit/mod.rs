//! Command Rate Limiting Module
//!
//! Sliding-window throttling keyed by (identity, command class).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RateLimiter                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  (identity, class) ──► RateWindow [t0, t1, ... tn]          │
//! │                        prune on check, sweep on timer        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The limiter is an injected service object, not a global. Limited checks
//! never consume a slot, so probing cannot extend a wait.

pub mod config;
pub mod limiter;
pub mod window;

pub use config::RateLimitConfig;
pub use limiter::{RateLimitResult, RateLimiter};
pub use window::RateWindow;
