//! Environment configuration.

use std::net::SocketAddr;
use std::time::Duration;

use wms_outbox::PublisherConfig;

use crate::error::AppError;

/// Settings read at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Redis connection string.
    pub redis_url: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Pool size.
    pub database_max_connections: u32,
    /// Outbox publisher settings.
    pub publisher: PublisherConfig,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, AppError> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw:?}): {e}"))),
    }
}

impl RelayConfig {
    /// Reads the configuration through `lookup`, applying defaults for
    /// optional keys.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required key is missing or a value
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = PublisherConfig::default();
        let batch_size: usize = parsed(&lookup, "OUTBOX_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(AppError::Config(
                "OUTBOX_BATCH_SIZE must be greater than zero".to_owned(),
            ));
        }
        let poll_ms: u64 = parsed(
            &lookup,
            "OUTBOX_POLL_INTERVAL_MS",
            u64::try_from(defaults.poll_interval.as_millis()).unwrap_or(1000),
        )?;
        let timeout_ms: u64 = parsed(
            &lookup,
            "OUTBOX_DELIVERY_TIMEOUT_MS",
            u64::try_from(defaults.delivery_timeout.as_millis()).unwrap_or(5000),
        )?;
        if poll_ms == 0 || timeout_ms == 0 {
            return Err(AppError::Config(
                "outbox intervals must be greater than zero".to_owned(),
            ));
        }
        let max_attempts: i32 = parsed(&lookup, "OUTBOX_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts <= 0 {
            return Err(AppError::Config(
                "OUTBOX_MAX_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            redis_url: required(&lookup, "REDIS_URL")?,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parsed(&lookup, "PORT", 3000)?,
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            publisher: PublisherConfig {
                poll_interval: Duration::from_millis(poll_ms),
                batch_size,
                delivery_timeout: Duration::from_millis(timeout_ms),
                max_attempts,
            },
        })
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/wms"),
        ("REDIS_URL", "redis://localhost:6379"),
    ];

    #[test]
    fn test_defaults_apply_when_optional_keys_are_absent() {
        let config = RelayConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.publisher, PublisherConfig::default());
        assert_eq!(config.bind_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("PORT", "8081"),
            ("OUTBOX_POLL_INTERVAL_MS", "250"),
            ("OUTBOX_BATCH_SIZE", "20"),
            ("OUTBOX_DELIVERY_TIMEOUT_MS", "1500"),
            ("OUTBOX_MAX_ATTEMPTS", "4"),
        ]);

        let config = RelayConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.publisher.poll_interval, Duration::from_millis(250));
        assert_eq!(config.publisher.batch_size, 20);
        assert_eq!(config.publisher.delivery_timeout, Duration::from_millis(1500));
        assert_eq!(config.publisher.max_attempts, 4);
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = RelayConfig::from_lookup(lookup_from(&[("REDIS_URL", "redis://x")]));

        match result.unwrap_err() {
            AppError::Config(msg) => assert!(msg.contains("DATABASE_URL")),
            other => panic!("expected Config, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_port_is_a_config_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));

        let result = RelayConfig::from_lookup(lookup_from(&pairs));

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OUTBOX_BATCH_SIZE", "0"));

        let result = RelayConfig::from_lookup(lookup_from(&pairs));

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_non_positive_max_attempts_is_rejected() {
        for raw in ["0", "-3"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("OUTBOX_MAX_ATTEMPTS", raw));

            let result = RelayConfig::from_lookup(lookup_from(&pairs));

            match result.unwrap_err() {
                AppError::Config(msg) => assert!(msg.contains("OUTBOX_MAX_ATTEMPTS")),
                other => panic!("expected Config, got {other:?}"),
            }
        }
    }
}
