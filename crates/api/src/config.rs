//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::{CircuitBreakerConfig, HttpInventoryConfig};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL ledger; in-memory when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `GROCERY_BASE_URL`: inventory service; in-memory when unset
/// - `INVENTORY_TIMEOUT_SECS`: per-request inventory timeout (default: `10`)
/// - `SAGA_TIMEOUT_SECS`: deadline for one consumption mutation (default: `30`)
/// - `BREAKER_FAILURE_THRESHOLD`, `BREAKER_INTERVAL_SECS`,
///   `BREAKER_OPEN_TIMEOUT_SECS`, `BREAKER_HALF_OPEN_MAX`: circuit breaker
///   settings (defaults: `5`, `60`, `5`, `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub grocery_base_url: Option<String>,
    pub inventory_timeout: Duration,
    pub saga_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let breaker = CircuitBreakerConfig::new(defaults.breaker.name.clone())
            .with_failure_threshold(
                parsed(&lookup, "BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or(defaults.breaker.failure_threshold),
            )
            .with_interval(seconds(
                &lookup,
                "BREAKER_INTERVAL_SECS",
                defaults.breaker.interval,
            ))
            .with_open_timeout(seconds(
                &lookup,
                "BREAKER_OPEN_TIMEOUT_SECS",
                defaults.breaker.open_timeout,
            ))
            .with_half_open_max_requests(
                parsed(&lookup, "BREAKER_HALF_OPEN_MAX")
                    .unwrap_or(defaults.breaker.half_open_max_requests),
            );

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            grocery_base_url: non_empty("GROCERY_BASE_URL"),
            inventory_timeout: seconds(
                &lookup,
                "INVENTORY_TIMEOUT_SECS",
                defaults.inventory_timeout,
            ),
            saga_timeout: seconds(&lookup, "SAGA_TIMEOUT_SECS", defaults.saga_timeout),
            breaker,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// HTTP settings for the grocery service, when one is configured.
    pub fn inventory(&self) -> Option<HttpInventoryConfig> {
        self.grocery_base_url
            .as_ref()
            .map(|url| HttpInventoryConfig::new(url.clone()).with_timeout(self.inventory_timeout))
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    parsed(lookup, key).map(Duration::from_secs).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            grocery_base_url: None,
            inventory_timeout: Duration::from_secs(10),
            saga_timeout: Duration::from_secs(30),
            breaker: CircuitBreakerConfig::new("grocery"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert!(config.inventory().is_none());
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.interval, Duration::from_secs(60));
        assert_eq!(config.breaker.open_timeout, Duration::from_secs(5));
        assert_eq!(config.breaker.half_open_max_requests, 5);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_overrides() {
        let config = config_from(&[
            ("PORT", "8081"),
            ("GROCERY_BASE_URL", "http://grocery:9000"),
            ("INVENTORY_TIMEOUT_SECS", "3"),
            ("BREAKER_FAILURE_THRESHOLD", "2"),
            ("BREAKER_OPEN_TIMEOUT_SECS", "30"),
        ]);

        assert_eq!(config.port, 8081);
        let inventory = config.inventory().unwrap();
        assert_eq!(inventory.base_url, "http://grocery:9000");
        assert_eq!(inventory.timeout, Duration::from_secs(3));
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.breaker.open_timeout, Duration::from_secs(30));
        assert_eq!(config.breaker.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("DATABASE_URL", "  "),
            ("BREAKER_HALF_OPEN_MAX", "-1"),
        ]);

        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.breaker.half_open_max_requests, 5);
    }
}
