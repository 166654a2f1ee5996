//! Prometheus metrics for microtrace.
//!
//! Request rate, errors and latency, labelled by method and route template.
//! All updates go through prometheus' atomic counters, so a single
//! [`Metrics`] can be shared across request tasks behind an `Arc`.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    DEFAULT_BUCKETS,
};

use crate::config::MetricsConfig;

/// Route label for every request that matched no route. Raw paths never
/// become label values, so unknown URLs cannot grow the series count.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Content type of [`Metrics::render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Process-wide request metrics.
pub struct Metrics {
    registry: Registry,

    /// Completed requests by method, route, status
    pub requests_total: IntCounterVec,

    /// Request latency in seconds by method, route
    pub request_latency_seconds: HistogramVec,

    /// Validation errors and handler faults by method, route, kind
    pub errors_total: IntCounterVec,
}

impl Metrics {
    /// Create a registry with prometheus' default latency buckets.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_buckets(DEFAULT_BUCKETS.to_vec())
    }

    pub fn from_config(config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        match config.buckets {
            Some(ref buckets) => Self::with_buckets(buckets.clone()),
            None => Self::new(),
        }
    }

    /// Create a registry with custom latency bucket bounds (seconds).
    pub fn with_buckets(buckets: Vec<f64>) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("microtrace_requests_total", "Total HTTP requests processed"),
            &["method", "route", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "microtrace_request_latency_seconds",
                "Request latency in seconds",
            )
            .buckets(buckets),
            &["method", "route"],
        )?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new(
                "microtrace_errors_total",
                "Total requests that failed validation or raised a fault",
            ),
            &["method", "route", "kind"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_latency_seconds,
            errors_total,
        })
    }

    /// Record one completed request.
    pub fn record(&self, method: &str, route: &str, status: u16, elapsed_secs: f64) {
        let status = status.to_string();

        self.requests_total
            .with_label_values(&[method, route, &status])
            .inc();

        self.request_latency_seconds
            .with_label_values(&[method, route])
            .observe(elapsed_secs);
    }

    /// Count a failed request (`validation`, `fault`, `panic`).
    pub fn record_error(&self, method: &str, route: &str, kind: &str) {
        self.errors_total
            .with_label_values(&[method, route, kind])
            .inc();
    }

    /// Current request count for one label set.
    pub fn request_count(&self, method: &str, route: &str, status: u16) -> u64 {
        self.requests_total
            .get_metric_with_label_values(&[method, route, &status.to_string()])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Current latency observation count for one label set.
    pub fn latency_count(&self, method: &str, route: &str) -> u64 {
        self.request_latency_seconds
            .get_metric_with_label_values(&[method, route])
            .map(|h| h.get_sample_count())
            .unwrap_or(0)
    }

    pub fn error_count(&self, method: &str, route: &str, kind: &str) -> u64 {
        self.errors_total
            .get_metric_with_label_values(&[method, route, kind])
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Render all metrics in Prometheus text format.
    ///
    /// Never fails: an encoding error is logged and yields an empty body.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(target: "microtrace.server", error = %e, "metrics_encode_failed");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
    }

    /// Get the Prometheus registry (for custom metrics).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
