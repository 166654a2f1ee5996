//! OTLP export of request spans.
//!
//! Builds the SDK tracer provider behind [`Tracer`](super::Tracer) with a
//! batch processor that ships spans to an OTLP collector (Jaeger, Tempo,
//! Datadog) in the background, so exporting never blocks a request.
//!
//! # Configuration
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default: `http://localhost:4317`)
//! - `OTEL_SERVICE_NAME`: Service name in traces (default: `microtrace`)
//! - `OTEL_SERVICE_VERSION`: Service version (default: from Cargo.toml)
//! - `OTEL_ENVIRONMENT`: Deployment environment (default: `development`)
//! - `OTEL_SAMPLING_RATIO`: Sampling ratio 0.0-1.0 (default: `1.0`)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (`1` = enabled)

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{Config, Sampler, TracerProvider},
    Resource,
};
use std::time::Duration;
use tracing::info;

// Semantic convention keys (avoiding dependency on semconv_experimental feature)
const SERVICE_NAME: &str = "service.name";
const SERVICE_VERSION: &str = "service.version";
const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// OpenTelemetry configuration.
#[derive(Debug, Clone)]
pub struct OtelConfig {
    /// OTLP endpoint (e.g., "http://jaeger:4317")
    pub endpoint: String,
    pub service_name: String,
    pub service_version: String,
    /// Deployment environment (production, staging, etc.)
    pub environment: String,
    /// Sampling ratio (0.0 - 1.0, 1.0 = sample all)
    pub sampling_ratio: f64,
    /// Export timeout in seconds
    pub export_timeout_secs: u64,
    pub enabled: bool,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4317".into(),
            service_name: "microtrace".into(),
            service_version: env!("CARGO_PKG_VERSION").into(),
            environment: "development".into(),
            sampling_ratio: 1.0,
            export_timeout_secs: 10,
            enabled: false,
        }
    }
}

impl OtelConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let enabled = std::env::var("OTEL_ENABLED")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".into()),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "microtrace".into()),
            service_version: std::env::var("OTEL_SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").into()),
            environment: std::env::var("OTEL_ENVIRONMENT")
                .unwrap_or_else(|_| "development".into()),
            sampling_ratio: std::env::var("OTEL_SAMPLING_RATIO")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            export_timeout_secs: std::env::var("OTEL_EXPORT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Build the OTLP tracer provider.
///
/// Returns `None` when OpenTelemetry is disabled. Must run inside a tokio
/// runtime (the batch processor spawns onto it). Call
/// [`Tracer::shutdown`](super::Tracer::shutdown) before exit to flush.
pub fn init_tracing(
    config: &OtelConfig,
) -> Result<Option<TracerProvider>, Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!(target: "microtrace.tracing", "OpenTelemetry disabled (OTEL_ENABLED != 1)");
        return Ok(None);
    }

    let resource = Resource::new([
        KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
        KeyValue::new(DEPLOYMENT_ENVIRONMENT, config.environment.clone()),
    ]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .with_timeout(Duration::from_secs(config.export_timeout_secs))
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            Config::default()
                .with_resource(resource)
                .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio)),
        )
        .build();

    info!(
        target: "microtrace.tracing",
        endpoint = %config.endpoint,
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        sampling = %config.sampling_ratio,
        "OpenTelemetry tracing initialized"
    );

    Ok(Some(provider))
}
