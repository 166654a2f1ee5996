//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use super::parse::{env_opt, env_or, env_parse};
use super::ConfigError;

/// Server configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8000).
    pub listen_addr: SocketAddr,
    /// Internal server address for /health and /metrics.
    pub internal_addr: Option<SocketAddr>,
    /// Header carrying the correlation id (default: X-Request-ID).
    pub request_id_header: String,
    /// Simulated work inside the analysis worker.
    pub worker_delay: Duration,
    /// Graceful shutdown drain timeout.
    pub drain_timeout: Duration,
    /// Largest request body read before answering 413.
    pub max_body_bytes: usize,
}

/// Default request body limit (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            internal_addr: None,
            request_id_header: "X-Request-ID".to_string(),
            worker_delay: Duration::from_millis(10),
            drain_timeout: Duration::from_secs(30),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = env_or("LISTEN_ADDR", "0.0.0.0:8000")
            .parse()
            .map_err(|e| ConfigError::Parse {
                key: "LISTEN_ADDR".into(),
                value: env_or("LISTEN_ADDR", "0.0.0.0:8000"),
                error: format!("{}", e),
            })?;

        let internal_addr = env_opt("INTERNAL_ADDR")
            .map(|s| {
                s.parse::<SocketAddr>().map_err(|e| ConfigError::Parse {
                    key: "INTERNAL_ADDR".into(),
                    value: s,
                    error: format!("{}", e),
                })
            })
            .transpose()?;

        let request_id_header = env_or("REQUEST_ID_HEADER", "X-Request-ID");
        if http::HeaderName::from_bytes(request_id_header.as_bytes()).is_err() {
            return Err(ConfigError::Invalid {
                key: "REQUEST_ID_HEADER".into(),
                message: format!("'{}' is not a valid header name", request_id_header),
            });
        }

        let worker_delay_ms: u64 = env_parse("WORKER_DELAY_MS", 10)?;
        let drain_timeout_secs: u64 = env_parse("DRAIN_TIMEOUT_SECS", 30)?;
        let max_body_bytes: usize = env_parse("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;

        Ok(Self {
            listen_addr,
            internal_addr,
            request_id_header,
            worker_delay: Duration::from_millis(worker_delay_ms),
            drain_timeout: Duration::from_secs(drain_timeout_secs),
            max_body_bytes,
        })
    }
}
