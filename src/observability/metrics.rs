//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_ride_requests_total` (counter): ride requests by outcome
//! - `dispatch_request_duration_seconds` (histogram): request latency by outcome
//! - `dispatch_selection_attempts_total` (counter): reservation attempts by result
//! - `dispatch_notifications_total` (counter): notifications by outcome
//! - `dispatch_pending_replayed_total` (counter): pending events replayed
//! - `dispatch_connected_drivers` (gauge): drivers with a live channel
//! - `dispatch_pending_notifications` (gauge): undelivered events
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade; when no
//!   exporter is installed the calls are no-ops
//! - Labels are small closed sets of static strings

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_ride_request(outcome: &'static str, started: Instant) {
    counter!("dispatch_ride_requests_total", "outcome" => outcome).increment(1);
    histogram!("dispatch_request_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_selection_attempt(result: &'static str) {
    counter!("dispatch_selection_attempts_total", "result" => result).increment(1);
}

pub fn record_notification(outcome: &'static str) {
    counter!("dispatch_notifications_total", "outcome" => outcome).increment(1);
}

pub fn record_pending_replayed(count: usize) {
    counter!("dispatch_pending_replayed_total").increment(count as u64);
}

pub fn set_connected_drivers(count: usize) {
    gauge!("dispatch_connected_drivers").set(count as f64);
}

pub fn set_pending_notifications(count: usize) {
    gauge!("dispatch_pending_notifications").set(count as f64);
}
