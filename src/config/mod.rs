//! Configuration module for microtrace.
//!
//! All settings come from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use microtrace::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen address: {}", config.server.listen_addr);
//! println!("Chaos enabled: {}", config.chaos.enabled);
//! ```

mod chaos;
mod error;
mod logging;
mod metrics;
mod parse;
mod server;
mod tracing;

pub use chaos::ChaosConfig;
pub use error::ConfigError;
pub use logging::LoggingConfig;
pub use metrics::MetricsConfig;
pub use parse::{parse_buckets, parse_list};
pub use server::ServerConfig;
pub use tracing::TracingConfig;

/// Complete application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Listener and handler settings.
    pub server: ServerConfig,
    /// Latency fault injection.
    pub chaos: ChaosConfig,
    /// Prometheus metrics.
    pub metrics: MetricsConfig,
    /// Request span settings.
    pub tracing: TracingConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            chaos: ChaosConfig::from_env()?,
            metrics: MetricsConfig::from_env()?,
            tracing: TracingConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use ::tracing::info;

        info!(target: "microtrace.server", "Configuration loaded:");
        info!(target: "microtrace.server", "  Listen: {}", self.server.listen_addr);
        info!(target: "microtrace.server", "  Request id header: {}", self.server.request_id_header);
        info!(
            target: "microtrace.server",
            "  Worker delay: {}ms",
            self.server.worker_delay.as_millis()
        );
        info!(target: "microtrace.server", "  Max body: {} bytes", self.server.max_body_bytes);

        if let Some(ref internal) = self.server.internal_addr {
            info!(target: "microtrace.server", "  Internal server: {}", internal);
        }

        match self.metrics.buckets {
            Some(ref buckets) => info!(target: "microtrace.server", "  Latency buckets: {:?}", buckets),
            None => info!(target: "microtrace.server", "  Latency buckets: default"),
        }

        if !self.tracing.excluded_paths.is_empty() {
            info!(
                target: "microtrace.server",
                "  Untraced paths: {}",
                self.tracing.excluded_paths.join(",")
            );
        }

        if self.chaos.enabled {
            info!(
                target: "microtrace.server",
                "  Chaos: p={} delay={}..={}ms",
                self.chaos.probability, self.chaos.min_delay_ms, self.chaos.max_delay_ms
            );
        } else {
            info!(target: "microtrace.server", "  Chaos: disabled");
        }
    }
}
