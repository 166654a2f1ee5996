//! Metrics configuration.

use super::parse::{env_opt, parse_buckets};
use super::ConfigError;

/// Metrics configuration loaded from environment.
#[derive(Clone, Debug, Default)]
pub struct MetricsConfig {
    /// Latency histogram bounds in seconds; `None` keeps prometheus defaults.
    pub buckets: Option<Vec<f64>>,
}

impl MetricsConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let buckets = match env_opt("METRICS_BUCKETS") {
            Some(raw) => Some(parse_buckets(&raw).map_err(|message| ConfigError::Invalid {
                key: "METRICS_BUCKETS".into(),
                message,
            })?),
            None => None,
        };
        Ok(Self { buckets })
    }
}
