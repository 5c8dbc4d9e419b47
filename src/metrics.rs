//! Prometheus metrics facade.
//!
//! Thin wrappers around the `metrics` crate's macros so call sites don't
//! repeat label names, mirroring the HTTP metrics middleware's approach of
//! centralizing instrumentation behind a handful of named functions.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide recorder and configures histogram buckets
/// for the latency-sensitive metrics. Call once at startup.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("trade_desk_http_request_duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .unwrap()
        .set_buckets_for_metric(
            Matcher::Full("trade_desk_scoring_duration_seconds".to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1],
        )
        .unwrap()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_match_found(commodity: &str) {
    counter!("trade_desk_matches_found_total", "commodity" => commodity.to_string()).increment(1);
}

pub fn record_match_blocked(reason: &str) {
    counter!("trade_desk_matches_blocked_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_scoring_duration(seconds: f64) {
    histogram!("trade_desk_scoring_duration_seconds").record(seconds);
}

pub fn record_allocation_attempt(outcome: &str) {
    counter!("trade_desk_allocation_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_webhook_delivery(event_type: &str, outcome: &str) {
    counter!(
        "trade_desk_webhook_deliveries_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn set_webhook_queue_depth(tenant: &str, depth: i64) {
    gauge!("trade_desk_webhook_queue_depth", "tenant" => tenant.to_string()).set(depth as f64);
}

pub fn set_http_requests_in_flight(delta: i64) {
    gauge!("trade_desk_http_requests_in_flight").increment(delta as f64);
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!(
        "trade_desk_http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("trade_desk_http_request_duration_seconds", "path" => path.to_string())
        .record(duration_secs);
}
