//! Application configuration loaded from environment variables.

use std::time::Duration;

use fulfillment::FulfillmentConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `ORDER_TIMEOUT_MINUTES`: unpaid order lifetime (default: `15`)
/// - `STOCK_RETRY_TIMES`: stock decrement attempts (default: `3`)
/// - `CACHE_DELAY_DELETE_MILLIS`: second cache delete delay (default: `500`)
/// - `ORDER_SWEEP_INTERVAL_SECS`: reconciliation sweep period (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub fulfillment: FulfillmentConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = FulfillmentConfig::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let fulfillment = FulfillmentConfig {
            order_timeout: parsed("ORDER_TIMEOUT_MINUTES")
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.order_timeout),
            stock_retry: fulfillment::StockRetryPolicy {
                max_attempts: parsed("STOCK_RETRY_TIMES")
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.stock_retry.max_attempts),
                ..defaults.stock_retry
            },
            cache_delay_delete: parsed("CACHE_DELAY_DELETE_MILLIS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_delay_delete),
            sweep_interval: parsed("ORDER_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            ..defaults
        };

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            fulfillment,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            fulfillment: FulfillmentConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.fulfillment, FulfillmentConfig::default());
    }

    #[test]
    fn test_empty_environment_matches_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.addr(), Config::default().addr());
        assert_eq!(config.fulfillment, FulfillmentConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/market"),
            ("ORDER_TIMEOUT_MINUTES", "30"),
            ("STOCK_RETRY_TIMES", "5"),
            ("CACHE_DELAY_DELETE_MILLIS", "1000"),
            ("ORDER_SWEEP_INTERVAL_SECS", "10"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/market")
        );
        assert_eq!(config.fulfillment.order_timeout, Duration::from_secs(1800));
        assert_eq!(config.fulfillment.stock_retry.max_attempts, 5);
        assert_eq!(
            config.fulfillment.stock_retry.base_backoff,
            Duration::from_millis(50)
        );
        assert_eq!(
            config.fulfillment.cache_delay_delete,
            Duration::from_millis(1000)
        );
        assert_eq!(config.fulfillment.sweep_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "http"),
            ("ORDER_TIMEOUT_MINUTES", "0"),
            ("STOCK_RETRY_TIMES", "-1"),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.fulfillment.order_timeout, Duration::from_secs(900));
        assert_eq!(config.fulfillment.stock_retry.max_attempts, 3);
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
}
