//! Metrics collection and exposition.
//!
//! # Metrics
//! - `redfish_requests_total` (counter): requests by method, status
//! - `redfish_request_duration_seconds` (histogram): latency distribution
//! - `redfish_mtls_auth_total` (counter): certificate outcomes
//! - `redfish_outbound_requests_total` (counter): outbound calls by destination, outcome
//! - `redfish_responses_finalized_total` (counter): gatherer finalizations by outcome
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "redfish_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("redfish_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_mtls_auth(outcome: &'static str) {
    counter!("redfish_mtls_auth_total", "outcome" => outcome).increment(1);
}

pub fn record_outbound(destination: &str, outcome: &'static str) {
    counter!(
        "redfish_outbound_requests_total",
        "destination" => destination.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_finalized(outcome: &'static str) {
    counter!("redfish_responses_finalized_total", "outcome" => outcome).increment(1);
}
