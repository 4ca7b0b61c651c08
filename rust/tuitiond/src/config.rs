use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:4000/api";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name}: invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Normalised base URL, always ending in `/`.
    pub api_url: String,
    pub api_token: Option<String>,
    pub stale_time: Duration,
    pub gc_time: Duration,
    pub request_timeout: Duration,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: format!("{}/", DEFAULT_API_URL),
            api_token: None,
            stale_time: Duration::from_secs(120),
            gc_time: Duration::from_secs(600),
            request_timeout: Duration::from_secs(30),
            log_level: Level::INFO,
        }
    }
}

// Trailing slash so `Url::join("classes")` appends instead of replacing the
// last path segment.
pub fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(&format!("{}/", trimmed))
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

impl Config {
    /// Reads `TUITION_*` variables; unset or blank variables fall back to
    /// defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let api_url = match var("TUITION_API_URL") {
            None => defaults.api_url,
            Some(raw) => parse_base_url(&raw)
                .map_err(|e| ConfigError::Invalid {
                    name: "TUITION_API_URL",
                    value: raw.clone(),
                    reason: e.to_string(),
                })?
                .to_string(),
        };

        let stale_secs: u64 = parsed("TUITION_STALE_TIME_SECS", defaults.stale_time.as_secs())?;
        let gc_secs: u64 = parsed("TUITION_GC_TIME_SECS", defaults.gc_time.as_secs())?;
        let timeout_secs: u64 = parsed(
            "TUITION_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?;
        let log_level: Level = parsed("TUITION_LOG", defaults.log_level)?;

        if gc_secs < stale_secs {
            return Err(ConfigError::Invalid {
                name: "TUITION_GC_TIME_SECS",
                value: gc_secs.to_string(),
                reason: format!("must be >= TUITION_STALE_TIME_SECS ({})", stale_secs),
            });
        }

        Ok(Self {
            api_url,
            api_token: var("TUITION_API_TOKEN"),
            stale_time: Duration::from_secs(stale_secs),
            gc_time: Duration::from_secs(gc_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            log_level,
        })
    }

    pub fn with_api_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_url = parse_base_url(raw)
            .map_err(|e| ConfigError::Invalid {
                name: "TUITION_API_URL",
                value: raw.to_string(),
                reason: e.to_string(),
            })?
            .to_string();
        Ok(self)
    }

    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        parse_base_url(&self.api_url)
    }
}
