//! Configuration loading from the environment.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::consumer::ConsumerConfig;

/// Service configuration.
///
/// | Variable | Default |
/// |----------|---------|
/// | `HTTP_ADDR` | `0.0.0.0:8080` |
/// | `SERVICE_NAME` | `inventory` |
/// | `USE_PERSISTENT_STORES` | `false` |
/// | `DATABASE_URL` | required when persistent |
/// | `REDIS_URL` | `redis://localhost:6379` |
/// | `USER_UPDATED_CHANNEL` | `identity:user-updated` |
/// | `DEAD_LETTER_KEY` | unset (log-only dead letters) |
/// | `CONSUMER_MAX_IN_FLIGHT` | `16` |
/// | `CONSUMER_DRAIN_TIMEOUT_MS` | `5000` |
/// | `RECONCILE_MAX_ATTEMPTS` | `5` |
/// | `REQUEST_TIMEOUT_MS` | `10000` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub http_addr: String,
    pub service_name: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    pub user_updated_channel: String,
    pub dead_letter_key: Option<String>,
    pub consumer_max_in_flight: usize,
    pub consumer_drain_timeout: Duration,
    pub reconcile_max_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            service_name: "inventory".to_string(),
            use_persistent_stores: false,
            database_url: None,
            redis_url: "redis://localhost:6379".to_string(),
            user_updated_channel: "identity:user-updated".to_string(),
            dead_letter_key: None,
            consumer_max_in_flight: 16,
            consumer_drain_timeout: Duration::from_millis(5_000),
            reconcile_max_attempts: 5,
            request_timeout: Duration::from_millis(10_000),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            http_addr: get("HTTP_ADDR").unwrap_or(defaults.http_addr),
            service_name: get("SERVICE_NAME").unwrap_or(defaults.service_name),
            use_persistent_stores: parse(&get, "USE_PERSISTENT_STORES")?
                .unwrap_or(defaults.use_persistent_stores),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            user_updated_channel: get("USER_UPDATED_CHANNEL")
                .unwrap_or(defaults.user_updated_channel),
            dead_letter_key: get("DEAD_LETTER_KEY"),
            consumer_max_in_flight: parse(&get, "CONSUMER_MAX_IN_FLIGHT")?
                .unwrap_or(defaults.consumer_max_in_flight),
            consumer_drain_timeout: parse(&get, "CONSUMER_DRAIN_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.consumer_drain_timeout),
            reconcile_max_attempts: parse(&get, "RECONCILE_MAX_ATTEMPTS")?
                .unwrap_or(defaults.reconcile_max_attempts),
            request_timeout: parse(&get, "REQUEST_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
        };

        if config.use_persistent_stores && config.database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        }
        if config.consumer_max_in_flight == 0 {
            anyhow::bail!("CONSUMER_MAX_IN_FLIGHT must be at least 1");
        }

        Ok(config)
    }

    pub fn consumer(&self) -> ConsumerConfig {
        ConsumerConfig {
            max_in_flight: self.consumer_max_in_flight,
            drain_timeout: self.consumer_drain_timeout,
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {key}"))
}
