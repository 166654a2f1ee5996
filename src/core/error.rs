//! Core error types.

use std::fmt;

use crate::config::ConfigError;

/// Errors surfaced while starting or running the service.
#[derive(Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration.
    Config(ConfigError),

    /// Metric registration failed.
    Metrics(prometheus::Error),

    /// Trace exporter could not be set up.
    Tracing(String),

    /// I/O error (bind, accept).
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "configuration error: {}", e),
            Error::Metrics(e) => write!(f, "metrics error: {}", e),
            Error::Tracing(msg) => write!(f, "tracing error: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Metrics(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Tracing(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::Metrics(e)
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
