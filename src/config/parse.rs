//! Environment variable parsing utilities.

use std::str::FromStr;

use super::ConfigError;

/// Get environment variable with default value.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get optional environment variable (None if empty or missing).
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// Parse environment variable as boolean.
/// Treats "1", "true", "yes" (case-insensitive) as true.
pub fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Parse environment variable with type conversion.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
            key: key.into(),
            value: v,
            error: e.to_string(),
        }),
        _ => Ok(default),
    }
}

pub fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

/// Split a comma separated list, dropping blanks.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Parse histogram bucket bounds in seconds ("0.005,0.01,0.1").
/// Bounds must be finite and strictly ascending.
pub fn parse_buckets(s: &str) -> Result<Vec<f64>, String> {
    let mut buckets = Vec::new();
    for item in parse_list(s) {
        let bound: f64 = item
            .parse()
            .map_err(|_| format!("invalid bucket bound: {}", item))?;
        if !bound.is_finite() {
            return Err(format!("bucket bound must be finite: {}", item));
        }
        if let Some(&last) = buckets.last() {
            if bound <= last {
                return Err(format!("buckets must be ascending: {} after {}", bound, last));
            }
        }
        buckets.push(bound);
    }

    if buckets.is_empty() {
        return Err("no bucket bounds given".to_string());
    }
    Ok(buckets)
}
