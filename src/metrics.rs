// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the SDK.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host app chooses the exporter (or none, in which case every call is
//! a no-op).
//!
//! # Metric Naming Convention
//! - `mobana_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `endpoint`: find, conversion, flow, flow_event
//! - `outcome`: success, network, timeout, server
//! - `source`: memory, storage, network (attribution); fresh, cached, stale (flows)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the classified outcome of an API request
pub fn record_api_request(endpoint: &'static str, outcome: &'static str) {
    counter!(
        "mobana_api_requests_total",
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record API request latency
pub fn record_latency(endpoint: &'static str, duration: Duration) {
    histogram!(
        "mobana_api_request_seconds",
        "endpoint" => endpoint
    )
    .record(duration.as_secs_f64());
}

/// Record an attribution result and where it was served from
pub fn record_attribution(status: &'static str, source: &'static str) {
    counter!(
        "mobana_attribution_results_total",
        "status" => status,
        "source" => source
    )
    .increment(1);
}

/// Record what happened to a tracked conversion (sent, queued, dropped)
pub fn record_conversion(outcome: &'static str) {
    counter!(
        "mobana_conversions_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record `count` conversions with the same outcome (e.g. a flush batch)
pub fn record_conversions(outcome: &'static str, count: usize) {
    counter!(
        "mobana_conversions_total",
        "outcome" => outcome
    )
    .increment(count as u64);
}

/// Set conversion queue depth (events awaiting retry)
pub fn set_conversion_queue_depth(count: usize) {
    gauge!("mobana_conversion_queue_depth").set(count as f64);
}

/// Record where presented (or prefetched) flow content came from
pub fn record_flow(source: &'static str) {
    counter!(
        "mobana_flow_results_total",
        "source" => source
    )
    .increment(1);
}

/// Record a swallowed durable storage error
pub fn record_storage_error(operation: &'static str) {
    counter!(
        "mobana_storage_errors_total",
        "operation" => operation
    )
    .increment(1);
}

/// A timing guard that records request latency on drop
pub struct LatencyTimer {
    endpoint: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.endpoint, self.start.elapsed());
    }
}
