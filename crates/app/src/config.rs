//! Process configuration, read from `AJO_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use ajo_infra::DEFAULT_RETRY_ATTEMPTS;
use ajo_observability::{LogFormat, ObservabilityConfig};

pub const ENV_LOG_LEVEL: &str = "AJO_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "AJO_LOG_FORMAT";
pub const ENV_DISPATCH_RETRY_ATTEMPTS: &str = "AJO_DISPATCH_RETRY_ATTEMPTS";
pub const ENV_CODE_GENERATION_ATTEMPTS: &str = "AJO_CODE_GENERATION_ATTEMPTS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "AJO_SWEEP_INTERVAL_SECS";
pub const ENV_CURRENCY: &str = "AJO_CURRENCY";
pub const ENV_EVENT_LOG: &str = "AJO_EVENT_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub observability: ObservabilityConfig,
    /// Attempts per command when a stream is being written concurrently.
    pub dispatch_retry_attempts: u32,
    /// Draws before invitation code generation gives up.
    pub code_generation_attempts: u32,
    pub sweep_interval_secs: u64,
    /// ISO 4217 code passed to the bank account verifier.
    pub currency: String,
    /// JSON-lines event journal the sweeper restores from and appends to.
    pub event_log: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig::default(),
            dispatch_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            code_generation_attempts: 10,
            sweep_interval_secs: 3_600,
            currency: "NGN".to_string(),
            event_log: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            if level.trim().is_empty() {
                return Err(ConfigError::invalid(ENV_LOG_LEVEL, &level, "must not be empty"));
            }
            config.observability.level = level.trim().to_string();
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.observability.format = format
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid(ENV_LOG_FORMAT, &format, e.to_string()))?;
        }
        if let Some(raw) = lookup(ENV_DISPATCH_RETRY_ATTEMPTS) {
            config.dispatch_retry_attempts = parse_positive(ENV_DISPATCH_RETRY_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CODE_GENERATION_ATTEMPTS) {
            config.code_generation_attempts = parse_positive(ENV_CODE_GENERATION_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_SECS) {
            config.sweep_interval_secs = parse_positive(ENV_SWEEP_INTERVAL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CURRENCY) {
            let currency = raw.trim().to_ascii_uppercase();
            if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
                return Err(ConfigError::invalid(ENV_CURRENCY, &raw, "expected a three-letter currency code"));
            }
            config.currency = currency;
        }
        if let Some(raw) = lookup(ENV_EVENT_LOG) {
            if raw.trim().is_empty() {
                return Err(ConfigError::invalid(ENV_EVENT_LOG, &raw, "must not be empty"));
            }
            config.event_log = Some(PathBuf::from(raw.trim()));
        }

        Ok(config)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        Ok(_) => Err(ConfigError::invalid(key, raw, "must be greater than zero")),
        Err(_) => Err(ConfigError::invalid(key, raw, "not a number")),
    }
}
