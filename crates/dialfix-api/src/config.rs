use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use dialfix_core::util::is_http_url;
use dialfix_core::PushConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub people_api_url: String,
    pub google_access_token: String,
    pub push_throttle: Duration,
    pub push_max_retries: u32,
    pub push_initial_backoff: Duration,
    pub rate_limit_window: Duration,
    pub rate_limit_per_window: u32,
    pub cors_origins: Vec<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("people_api_url", &self.people_api_url)
            .field("google_access_token", &"[REDACTED]")
            .field("push_throttle", &self.push_throttle)
            .field("push_max_retries", &self.push_max_retries)
            .field("push_initial_backoff", &self.push_initial_backoff)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("rate_limit_per_window", &self.rate_limit_per_window)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "DIALFIX_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, "DIALFIX_DATABASE_PATH", "dialfix.db");

        let people_api_url = value_or_default(
            &lookup,
            "GOOGLE_PEOPLE_API_URL",
            "https://people.googleapis.com",
        );
        if !is_http_url(&people_api_url) {
            return Err(ConfigError::Invalid(
                "GOOGLE_PEOPLE_API_URL must start with http:// or https://".to_string(),
            ));
        }
        let google_access_token = required_trimmed(&lookup, "GOOGLE_ACCESS_TOKEN")?;

        let push_throttle_ms = ranged(&lookup, "PUSH_THROTTLE_MS", 1_000, 0..=60_000)?;
        let push_max_retries = ranged(&lookup, "PUSH_MAX_RETRIES", 3, 0..=10)?;
        let push_initial_backoff_secs =
            ranged(&lookup, "PUSH_INITIAL_BACKOFF_SECS", 60, 1..=3_600)?;
        let rate_limit_window_secs = ranged(&lookup, "RATE_LIMIT_WINDOW_SECS", 60, 10..=3_600)?;
        let rate_limit_per_window = ranged(&lookup, "RATE_LIMIT_PER_MINUTE", 100, 1..=10_000)?;

        let cors_origins: Vec<String> =
            value_or_default(&lookup, "CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        if let Some(origin) = cors_origins.iter().find(|origin| !is_http_url(origin)) {
            return Err(ConfigError::Invalid(format!(
                "CORS_ORIGINS entry `{origin}` must start with http:// or https://"
            )));
        }

        Ok(Self {
            bind_addr,
            database_path,
            people_api_url,
            google_access_token,
            push_throttle: Duration::from_millis(push_throttle_ms),
            push_max_retries: u32::try_from(push_max_retries).map_err(|_| {
                ConfigError::Invalid("PUSH_MAX_RETRIES is out of range".to_string())
            })?,
            push_initial_backoff: Duration::from_secs(push_initial_backoff_secs),
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            rate_limit_per_window: u32::try_from(rate_limit_per_window).map_err(|_| {
                ConfigError::Invalid("RATE_LIMIT_PER_MINUTE is out of range".to_string())
            })?,
            cors_origins,
        })
    }

    /// Push engine settings derived from this configuration
    pub fn push_config(&self) -> PushConfig {
        PushConfig::default()
            .with_throttle_delay(self.push_throttle)
            .with_max_retries(self.push_max_retries)
            .with_initial_backoff(self.push_initial_backoff)
    }
}

fn ranged(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
