//! HTTP and Cache Configuration Module
//!
//! Settings for the HTTP read API, the order cache and warm start. Loaded from
//! environment variables with defaults suitable for local development. Store,
//! broker, ingestion and telemetry settings live next to the code they drive.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_LIMIT, DEFAULT_HTTP_ADDR, DEFAULT_HTTP_REQUEST_TIMEOUT_SECS,
    DEFAULT_LOOKUP_TIMEOUT_MS, DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_STARTUP_LOAD,
};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP, cache and lifecycle configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    // ========================================================================
    // HTTP
    // ========================================================================
    /// Bind address as configured, e.g. `:8080` or `127.0.0.1:8080`.
    pub http_addr: String,

    /// Ceiling for a whole request, after which the client gets 408.
    pub request_timeout: Duration,

    /// Bound on the store lookup performed on a cache miss.
    pub lookup_timeout: Duration,

    /// How long in-flight requests may run after shutdown begins.
    pub shutdown_grace: Duration,

    // ========================================================================
    // Cache
    // ========================================================================
    /// Maximum number of cached orders.
    pub cache_limit: usize,

    /// Number of recent orders loaded into the cache at boot.
    pub startup_load: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_HTTP_REQUEST_TIMEOUT_SECS),
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            cache_limit: DEFAULT_CACHE_LIMIT,
            startup_load: DEFAULT_STARTUP_LOAD,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `HTTP_ADDR`: bind address (default: `:8080`)
    /// - `ORDERS_HTTP_REQUEST_TIMEOUT_SECS`: per-request ceiling (default: 10)
    /// - `ORDERS_LOOKUP_TIMEOUT_MS`: store lookup bound on cache miss (default: 3000)
    /// - `ORDERS_SHUTDOWN_GRACE_SECS`: shutdown grace period (default: 10)
    /// - `ORDERS_CACHE_LIMIT`: cache capacity (default: 1000)
    /// - `ORDERS_STARTUP_LOAD`: warm-start size (default: 100)
    pub fn from_env() -> Self {
        Self {
            http_addr: std::env::var("HTTP_ADDR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            request_timeout: Duration::from_secs(env_parse(
                "ORDERS_HTTP_REQUEST_TIMEOUT_SECS",
                DEFAULT_HTTP_REQUEST_TIMEOUT_SECS,
            )),
            lookup_timeout: Duration::from_millis(env_parse(
                "ORDERS_LOOKUP_TIMEOUT_MS",
                DEFAULT_LOOKUP_TIMEOUT_MS,
            )),
            shutdown_grace: Duration::from_secs(env_parse(
                "ORDERS_SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )),
            cache_limit: env_parse("ORDERS_CACHE_LIMIT", DEFAULT_CACHE_LIMIT),
            startup_load: env_parse("ORDERS_STARTUP_LOAD", DEFAULT_STARTUP_LOAD),
        }
    }

    /// Resolve `http_addr` into a socket address.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        parse_bind_addr(&self.http_addr)
    }
}

/// Parse `host:port`, accepting a bare `:port` as "all interfaces".
pub fn parse_bind_addr(raw: &str) -> ApiResult<SocketAddr> {
    let raw = raw.trim();
    let addr = if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    };

    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", raw, e))
    })
}

/// Read and parse an environment variable, falling back to `default` when it
/// is unset or does not parse.
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag; anything other than `false`/`0` counts as true.
pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| {
            let s = s.trim().to_lowercase();
            s != "false" && s != "0"
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.http_addr, ":8080");
        assert_eq!(config.cache_limit, 1000);
        assert_eq!(config.startup_load, 100);
        assert_eq!(config.lookup_timeout, Duration::from_secs(3));
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_bare_port_binds_all_interfaces() -> ApiResult<()> {
        let addr = parse_bind_addr(":8080")?;
        assert_eq!(addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        Ok(())
    }

    #[test]
    fn test_explicit_host() -> ApiResult<()> {
        let addr = parse_bind_addr("127.0.0.1:9000")?;
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        Ok(())
    }

    #[test]
    fn test_invalid_bind_addr() {
        let err = parse_bind_addr("not-an-address");
        assert!(err.is_err());
        assert!(parse_bind_addr(":99999").is_err());
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        // Keys unique to this test.
        std::env::set_var("ORDERS_TEST_ENV_PARSE_GARBAGE", "twelve");
        assert_eq!(env_parse("ORDERS_TEST_ENV_PARSE_GARBAGE", 12usize), 12);

        std::env::set_var("ORDERS_TEST_ENV_PARSE_VALUE", " 42 ");
        assert_eq!(env_parse("ORDERS_TEST_ENV_PARSE_VALUE", 0usize), 42);

        assert_eq!(env_parse("ORDERS_TEST_ENV_PARSE_UNSET", 7u64), 7);
    }

    #[test]
    fn test_env_flag() {
        std::env::set_var("ORDERS_TEST_FLAG_OFF", "FALSE");
        assert!(!env_flag("ORDERS_TEST_FLAG_OFF", true));

        std::env::set_var("ORDERS_TEST_FLAG_ON", "yes");
        assert!(env_flag("ORDERS_TEST_FLAG_ON", false));

        assert!(env_flag("ORDERS_TEST_FLAG_UNSET", true));
    }
}
