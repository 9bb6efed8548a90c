//! Process configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Topics the services exchange events on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerTopics {
    /// Every saved event, relayed from the outbox.
    pub events: String,
    /// Verifications emitted by the validator.
    pub verifications: String,
}

impl Default for BrokerTopics {
    fn default() -> Self {
        Self {
            events: "url-events".to_owned(),
            verifications: "url-verifications".to_owned(),
        }
    }
}

/// Settings for the whole process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string. Without one, events live in memory.
    pub database_url: Option<String>,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Pause between two outbox relay passes.
    pub relay_interval: Duration,
    /// Maximum number of outbox events pulled per pass.
    pub outbox_batch_size: i64,
    /// Time allowed for one reachability check.
    pub reachability_timeout: Duration,
    /// Hosts the safety check rejects.
    pub blocked_hosts: Vec<String>,
    /// Broker topics.
    pub topics: BrokerTopics,
}

impl AppConfig {
    /// Reads the configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if it is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let port = parse(&lookup, "PORT", 3000_u16)?;
        let relay_interval = Duration::from_secs(parse(&lookup, "RELAY_INTERVAL_SECS", 5_u64)?);
        if relay_interval.is_zero() {
            return Err(AppError::Config(
                "RELAY_INTERVAL_SECS must be at least 1".into(),
            ));
        }
        let outbox_batch_size = parse(&lookup, "OUTBOX_BATCH_SIZE", 100_i64)?;
        if outbox_batch_size < 1 {
            return Err(AppError::Config(
                "OUTBOX_BATCH_SIZE must be at least 1".into(),
            ));
        }
        let reachability_timeout =
            Duration::from_secs(parse(&lookup, "REACHABILITY_TIMEOUT_SECS", 5_u64)?);
        let blocked_hosts = lookup("BLOCKED_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|host| !host.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            host,
            port,
            relay_interval,
            outbox_batch_size,
            reachability_timeout,
            blocked_hosts,
            topics: BrokerTopics::default(),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}
