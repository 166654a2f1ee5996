//! Request tracing configuration.

use super::parse::{env_or, parse_list};
use super::ConfigError;

/// Request tracing configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Request paths that never get a span (exact match).
    pub excluded_paths: Vec<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            excluded_paths: vec!["/metrics".to_string()],
        }
    }
}

impl TracingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            excluded_paths: parse_list(&env_or("TRACE_EXCLUDED_PATHS", "/metrics")),
        })
    }

    #[inline]
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| p == path)
    }
}
