//! Observability: request metrics and span tracing.
//!
//! # Usage
//!
//! ## Prometheus Metrics
//!
//! ```rust,ignore
//! use microtrace::observability::Metrics;
//!
//! let metrics = Metrics::new()?;
//! metrics.record("POST", "/analyze", 200, 0.012);
//! println!("{}", metrics.render());
//! ```
//!
//! ## Spans
//!
//! ```rust,ignore
//! use microtrace::observability::{extract_context, Tracer};
//!
//! let tracer = Tracer::with_exporter(exporter);
//! let root = tracer.start_root_span("POST /analyze", &extract_context(headers), "demo-123");
//! {
//!     let _child = tracer.start_span("work", Some(&root));
//! } // child ends here
//! ```
//!
//! ## OpenTelemetry (requires `otel` feature)
//!
//! ```rust,ignore
//! use microtrace::observability::{init_tracing, OtelConfig, Tracer};
//!
//! let tracer = match init_tracing(&OtelConfig::from_env())? {
//!     Some(provider) => Tracer::new(provider),
//!     None => Tracer::noop(),
//! };
//! // ... run server ...
//! tracer.shutdown();
//! ```

pub mod metrics;
pub mod propagation;
pub mod tracer;

#[cfg(feature = "otel")]
pub mod otel;

// Re-exports
pub use metrics::{Metrics, UNMATCHED_ROUTE};
pub use propagation::{extract_context, inject_context, TRACEPARENT};
pub use tracer::{SpanGuard, Tracer, REQUEST_ID_ATTR};

#[cfg(feature = "otel")]
pub use otel::{init_tracing, OtelConfig};
