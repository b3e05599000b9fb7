//! Relaybot Governor Library
//!
//! Per-identity usage governor for a command-dispatching chat bot: a
//! sliding-window command rate limiter, session-scoped integration
//! activation with daily quotas, and the routing rule that decides whether a
//! message goes to the integration or to a command handler.

pub mod config;
pub mod governor;
pub mod integration;
pub mod metrics;
pub mod metrics_server;
pub mod rate_limit;
pub mod router;
pub mod store;
pub mod telemetry;
pub mod transport;
