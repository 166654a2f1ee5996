//! microtrace - HTTP telemetry pipeline demo service.
//!
//! A small service around a trivial arithmetic endpoint whose point is the
//! request pipeline wrapped around it: every request is correlated, traced,
//! timed, counted and logged, with optional latency fault injection.
//!
//! # Features
//!
//! - **Request correlation**: `X-Request-ID` reused or generated, echoed back
//! - **Structured logging**: one JSON line per event, tagged with the request id
//! - **Prometheus metrics**: request count, latency histogram, error count
//! - **Tracing**: root span per request, W3C `traceparent`, OTLP export (`otel` feature)
//! - **Chaos**: random per-request delays, seedable
//!
//! # Architecture
//!
//! ```text
//! Request → RequestId → Tracing → AccessLog → Chaos → Handler
//!                                                       ↓
//! Response ← RequestId ← Tracing ← AccessLog ← Chaos ←──┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use microtrace::{Config, Pipeline, Server};
//!
//! let config = Config::from_env()?;
//! let metrics = Arc::new(Metrics::from_config(&config.metrics)?);
//! let pipeline = Arc::new(Pipeline::new(&config, metrics.clone(), Tracer::noop(), chaos));
//! Server::new(config.server, pipeline, metrics).run().await?;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars) with optional "-dirty" suffix
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)" or "0.1.0 (abc12345-dirty)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod config;
pub mod core;
pub mod handler;
pub mod logging;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod server;

// Re-exports for convenience
pub use config::Config;
pub use pipeline::Pipeline;
pub use server::Server;
