//! Chaos injection configuration.

use super::parse::{env_bool, env_opt, env_parse};
use super::ConfigError;

/// Latency fault injection settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ChaosConfig {
    /// Master switch (CHAOS_ENABLED, default off).
    pub enabled: bool,
    /// Chance that a single request is delayed, in [0, 1].
    pub probability: f64,
    /// Lower delay bound, inclusive.
    pub min_delay_ms: u64,
    /// Upper delay bound, inclusive.
    pub max_delay_ms: u64,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: 0.05,
            min_delay_ms: 100,
            max_delay_ms: 200,
            seed: None,
        }
    }
}

impl ChaosConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let seed = match env_opt("CHAOS_SEED") {
            Some(v) => Some(v.trim().parse::<u64>().map_err(|e| ConfigError::Parse {
                key: "CHAOS_SEED".into(),
                value: v.clone(),
                error: e.to_string(),
            })?),
            None => None,
        };

        let config = Self {
            enabled: env_bool("CHAOS_ENABLED", defaults.enabled),
            probability: env_parse("CHAOS_PROBABILITY", defaults.probability)?,
            min_delay_ms: env_parse("CHAOS_MIN_DELAY_MS", defaults.min_delay_ms)?,
            max_delay_ms: env_parse("CHAOS_MAX_DELAY_MS", defaults.max_delay_ms)?,
            seed,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ConfigError::Invalid {
                key: "CHAOS_PROBABILITY".into(),
                message: format!("{} is outside [0, 1]", self.probability),
            });
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid {
                key: "CHAOS_MIN_DELAY_MS".into(),
                message: format!(
                    "minimum delay {}ms exceeds maximum {}ms",
                    self.min_delay_ms, self.max_delay_ms
                ),
            });
        }
        Ok(())
    }
}
