//! Runtime configuration.
//!
//! Loaded with figment from an optional `sportscope.toml` and then the raw
//! process environment (`PORT`, `DATABASE_URL`, ...), the environment winning.
//! Durations accept plain seconds (`8`) or unit suffixes (`500ms`, `90s`, `5m`).

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::data::dashboard_cache::DEFAULT_TTL;

pub const CONFIG_FILE: &str = "sportscope.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base level for this crate's log targets; `RUST_LOG` overrides it entirely.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Postgres connection string. Without it the service runs on an in-memory store.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
    #[serde(default = "default_cache_ttl", deserialize_with = "deserialize_duration")]
    pub dashboard_cache_ttl: Duration,
    /// Bearer token required on mutating endpoints. Unset disables the check.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_cache_ttl() -> Duration {
    DEFAULT_TTL
}

impl Config {
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw())
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::figment()
            .extract()
            .context("Failed to load configuration")
    }
}

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ]);
    parser
        .parse(input.trim())
        .map_err(|e| format!("invalid duration '{input}': {e}"))?
        .try_into()
        .map_err(|e| format!("invalid duration '{input}': {e:?}"))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_units_and_bare_seconds() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("8").unwrap(), Duration::from_secs(8));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn defaults_apply() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_url, None);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(8));
        assert_eq!(config.dashboard_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn overrides_are_parsed() {
        let config: Config = Figment::new()
            .merge(("dashboard_cache_ttl", "90s"))
            .merge(("shutdown_timeout", 3))
            .merge(("port", 9000))
            .extract()
            .unwrap();
        assert_eq!(config.dashboard_cache_ttl, Duration::from_secs(90));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.port, 9000);
    }
}
