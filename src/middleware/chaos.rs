//! Latency fault injection.
//!
//! When enabled, each request is delayed with probability `p` by a duration
//! drawn uniformly from `[min_delay_ms, max_delay_ms]`. The delay is a
//! `tokio::time::sleep`, so only the affected request task is suspended.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Middleware, MiddlewareResult};
use crate::config::{ChaosConfig, ConfigError};
use crate::core::{Context, Request};

/// Decides and applies random request delays.
pub struct ChaosInjector {
    config: ChaosConfig,
    rng: Mutex<StdRng>,
}

impl ChaosInjector {
    /// Seeded from `config.seed` when set, otherwise from OS entropy.
    ///
    /// Fails on a configuration `decide` could not draw from: a probability
    /// outside `[0, 1]` or NaN, or `min_delay_ms > max_delay_ms`.
    pub fn new(config: ChaosConfig) -> Result<Self, ConfigError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn with_rng(config: ChaosConfig, rng: StdRng) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            rng: Mutex::new(rng),
        })
    }

    /// Injector that never delays.
    pub fn disabled() -> Self {
        Self {
            config: ChaosConfig::default(),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Draw the delay for one request, without sleeping.
    pub fn decide(&self) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if rng.gen::<f64>() >= self.config.probability {
            return None;
        }
        let ms = rng.gen_range(self.config.min_delay_ms..=self.config.max_delay_ms);
        Some(Duration::from_millis(ms))
    }

    /// Sleep for the drawn delay, if any, and return it.
    pub async fn maybe_delay(&self) -> Option<Duration> {
        let delay = self.decide()?;
        tracing::info!(
            target: "microtrace.chaos",
            delay_ms = delay.as_millis() as u64,
            probability = self.config.probability,
            "chaos_injected"
        );
        tokio::time::sleep(delay).await;
        Some(delay)
    }
}

impl std::fmt::Debug for ChaosInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosInjector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Pipeline stage that runs the injector before dispatch.
pub struct ChaosMiddleware {
    injector: Arc<ChaosInjector>,
}

impl ChaosMiddleware {
    pub fn new(injector: Arc<ChaosInjector>) -> Self {
        Self { injector }
    }
}

#[async_trait]
impl Middleware for ChaosMiddleware {
    fn name(&self) -> &'static str {
        "chaos"
    }

    async fn on_request(&self, req: Request, ctx: &mut Context) -> MiddlewareResult {
        if let Some(delay) = self.injector.maybe_delay().await {
            if let Some(span) = ctx.span_mut() {
                span.set_attribute("chaos.delay_ms", delay.as_millis() as i64);
            }
        }
        MiddlewareResult::Next(req)
    }
}
