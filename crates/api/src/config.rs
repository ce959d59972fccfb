//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DECISION_WINDOW_SECS` — owner decision window (default: `900`)
/// - `DATABASE_URL` — Postgres URL; in-memory store when unset
/// - `INVENTORY_URL` / `PAYMENT_URL` — authority base URLs; in-memory
///   gateways when either is unset
/// - `GATEWAY_API_KEY` — bearer token for both authorities
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub decision_window_secs: u64,
    pub database_url: Option<String>,
    pub inventory_url: Option<String>,
    pub payment_url: Option<String>,
    pub gateway_api_key: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            decision_window_secs: std::env::var("DECISION_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(900),
            database_url: std::env::var("DATABASE_URL").ok(),
            inventory_url: std::env::var("INVENTORY_URL").ok(),
            payment_url: std::env::var("PAYMENT_URL").ok(),
            gateway_api_key: std::env::var("GATEWAY_API_KEY").unwrap_or_default(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the owner decision window as a duration.
    pub fn decision_window(&self) -> Duration {
        Duration::from_secs(self.decision_window_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            decision_window_secs: 900,
            database_url: None,
            inventory_url: None,
            payment_url: None,
            gateway_api_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.decision_window(), Duration::from_secs(900));
        assert!(config.database_url.is_none());
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
