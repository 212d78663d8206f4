//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): forwarded requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency by method
//! - `gateway_waf_blocked_total` (counter): blocked requests by category
//! - `gateway_redirects_total` (counter): HTTPS enforcement redirects

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start the scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}

/// Record one forwarded request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(start_time.elapsed().as_secs_f64());
}

/// Record one finding category on a blocked request.
pub fn record_waf_block(category: &'static str) {
    metrics::counter!("gateway_waf_blocked_total", "category" => category).increment(1);
}

/// Record one HTTPS enforcement redirect.
pub fn record_redirect() {
    metrics::counter!("gateway_redirects_total").increment(1);
}
