// Prometheus metrics for the relaybot governor
//
// Exposes metrics on /metrics HTTP endpoint:
// - Messages routed by outcome (counter)
// - Rate limited commands by class (counter)
// - Quota rejections by reason (counter)
// - Integration sink latency (histogram) and failures (counter)
// - Live rate limit windows (gauge)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Routing metrics
    pub static ref MESSAGES_ROUTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("messages_routed_total", "Inbound messages by routing outcome"),
        &["outcome"]
    ).expect("Failed to create messages routed metric");

    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limited_total", "Commands rejected by the rate limiter"),
        &["command_class"]
    ).expect("Failed to create rate limited metric");

    pub static ref RATE_WINDOWS_ACTIVE: IntGauge = IntGauge::new(
        "rate_windows_active",
        "Number of tracked (identity, command class) windows"
    ).expect("Failed to create rate windows metric");

    // Quota metrics
    pub static ref QUOTA_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("quota_rejections_total", "Pass-through messages rejected by the governor"),
        &["reason"]
    ).expect("Failed to create quota rejections metric");

    pub static ref USAGE_RECORDED_TOTAL: IntCounter = IntCounter::new(
        "usage_recorded_total",
        "Total usage increments recorded against user quotas"
    ).expect("Failed to create usage recorded metric");

    // Integration sink metrics
    pub static ref SINK_REQUEST_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("sink_request_duration_seconds", "Integration sink round trip time"),
    ).expect("Failed to create sink duration metric");

    pub static ref SINK_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "sink_failures_total",
        "Integration sink calls that failed or timed out"
    ).expect("Failed to create sink failures metric");
}

/// Initialize metrics registry - must be called once at startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(MESSAGES_ROUTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMITED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_WINDOWS_ACTIVE.clone()))?;
    REGISTRY.register(Box::new(QUOTA_REJECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(USAGE_RECORDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SINK_REQUEST_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(SINK_FAILURES_TOTAL.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_metrics() {
        // May fail if already registered by another test, which is fine
        let _ = init();

        MESSAGES_ROUTED_TOTAL.with_label_values(&["dropped"]).inc();
        RATE_LIMITED_TOTAL.with_label_values(&["note"]).inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("messages_routed_total"));
        assert!(text.contains("rate_limited_total"));
    }

    #[test]
    fn test_gauge_set() {
        RATE_WINDOWS_ACTIVE.set(3);
        assert_eq!(RATE_WINDOWS_ACTIVE.get(), 3);
    }
}
