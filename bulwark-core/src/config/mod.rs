//! Configuration for the resilience patterns
//!
//! Settings load from TOML with environment variable overrides and are
//! validated before use. Durations are written in humantime notation
//! (`"250ms"`, `"30s"`).
//!
//! ```toml
//! [retry]
//! max_attempts = 5
//! initial_delay = "200ms"
//!
//! [circuit_breaker]
//! cooldown_period = "1m"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ErrorOptions, ResilienceError, Result};
use crate::patterns::{CircuitBreakerConfig, RetryConfig};

pub mod defaults;

pub use defaults::*;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetrySettings,
    pub circuit_breaker: BreakerSettings,
    pub logging: LoggingSettings,
}

/// Retry defaults applied to operations without their own policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    /// Deadline for each attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
            backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
            jitter: DEFAULT_RETRY_JITTER,
            timeout: DEFAULT_RETRY_ATTEMPT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub time_window: Duration,
    #[serde(with = "humantime_serde")]
    pub cooldown_period: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_BREAKER_SUCCESS_THRESHOLD,
            time_window: DEFAULT_BREAKER_TIME_WINDOW,
            cooldown_period: DEFAULT_BREAKER_COOLDOWN,
        }
    }
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level for this crate unless `RUST_LOG` is set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

fn config_error(message: impl Into<String>) -> ResilienceError {
    ResilienceError::configuration(message)
}

fn invalid_override(key: &str, value: &str, reason: impl std::fmt::Display) -> ResilienceError {
    ResilienceError::with_kind(
        crate::error::ErrorKind::Configuration,
        format!("Invalid value '{}' for {}: {}", value, key, reason),
        ErrorOptions::new()
            .code("INVALID_CONFIG")
            .context("variable", key),
    )
}

impl ResilienceConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    /// and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ResilienceError::with_kind(
                crate::error::ErrorKind::Configuration,
                format!("Failed to read config file {}: {}", path.display(), e),
                ErrorOptions::new()
                    .cause(crate::error::ErrorCause::native(e))
                    .context("path", path.display().to_string()),
            )
        })?;

        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML without overrides or validation
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `BULWARK_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BULWARK_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = value
                .trim()
                .parse()
                .map_err(|e| invalid_override("BULWARK_RETRY_MAX_ATTEMPTS", &value, e))?;
        }
        if let Some(value) = lookup("BULWARK_RETRY_TIMEOUT") {
            self.retry.timeout = parse_duration("BULWARK_RETRY_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("BULWARK_BREAKER_FAILURE_THRESHOLD") {
            self.circuit_breaker.failure_threshold = value
                .trim()
                .parse()
                .map_err(|e| invalid_override("BULWARK_BREAKER_FAILURE_THRESHOLD", &value, e))?;
        }
        if let Some(value) = lookup("BULWARK_BREAKER_COOLDOWN") {
            self.circuit_breaker.cooldown_period = parse_duration("BULWARK_BREAKER_COOLDOWN", &value)?;
        }
        if let Some(level) = lookup("BULWARK_LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(config_error("retry.max_attempts must be at least 1"));
        }
        if !(retry.backoff_factor >= 1.0) || !retry.backoff_factor.is_finite() {
            return Err(config_error(format!(
                "retry.backoff_factor must be a finite number >= 1.0, got {}",
                retry.backoff_factor
            )));
        }
        if retry.initial_delay > retry.max_delay {
            return Err(config_error("retry.initial_delay must not exceed retry.max_delay"));
        }
        if retry.timeout.is_zero() {
            return Err(config_error("retry.timeout must be greater than zero"));
        }

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(config_error("circuit_breaker.failure_threshold must be at least 1"));
        }
        if breaker.success_threshold == 0 {
            return Err(config_error("circuit_breaker.success_threshold must be at least 1"));
        }
        if breaker.time_window.is_zero() {
            return Err(config_error("circuit_breaker.time_window must be greater than zero"));
        }

        if !KNOWN_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(config_error(format!("Invalid log level: {}", self.logging.level)));
        }

        Ok(())
    }

    /// Retry policy built from these settings
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    /// Circuit breaker configuration built from these settings
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::from(&self.circuit_breaker)
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value.trim())
        .map_err(|e| invalid_override(key, value, e))
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts,
            initial_delay: settings.initial_delay,
            max_delay: settings.max_delay,
            backoff_factor: settings.backoff_factor,
            jitter: settings.jitter,
            timeout: settings.timeout,
            ..RetryConfig::default()
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            success_threshold: settings.success_threshold,
            time_window: settings.time_window,
            cooldown_period: settings.cooldown_period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResilienceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.circuit_breaker.cooldown_period, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = 5
            initial_delay = "250ms"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, DEFAULT_RETRY_MAX_DELAY);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.circuit_breaker, BreakerSettings::default());
    }

    #[test]
    fn test_malformed_toml_is_configuration_error() {
        let err = ResilienceConfig::from_toml_str("[retry\nmax_attempts = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("BULWARK_RETRY_MAX_ATTEMPTS", "7"),
            ("BULWARK_RETRY_TIMEOUT", "5s"),
            ("BULWARK_BREAKER_FAILURE_THRESHOLD", "9"),
            ("BULWARK_BREAKER_COOLDOWN", "2m"),
            ("BULWARK_LOG_LEVEL", "DEBUG"),
        ]
        .into_iter()
        .collect();

        let mut config = ResilienceConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.timeout, Duration::from_secs(5));
        assert_eq!(config.circuit_breaker.failure_threshold, 9);
        assert_eq!(config.circuit_breaker.cooldown_period, Duration::from_secs(120));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = ResilienceConfig::default();
        let err = config
            .apply_overrides(|key| (key == "BULWARK_RETRY_MAX_ATTEMPTS").then(|| "many".to_string()))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.context()["variable"], "BULWARK_RETRY_MAX_ATTEMPTS");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ResilienceConfig::default();
        config.retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.retry.initial_delay = Duration::from_secs(60);
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.logging.level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.message().contains("verbose"));
    }

    #[test]
    fn test_conversions() {
        let mut config = ResilienceConfig::default();
        config.retry.jitter = false;
        config.circuit_breaker.success_threshold = 4;

        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert!(!retry.jitter);
        assert!(retry.should_retry.is_none());

        let breaker = config.breaker_config();
        assert_eq!(breaker.success_threshold, 4);
        assert_eq!(
            breaker,
            CircuitBreakerConfig {
                success_threshold: 4,
                ..CircuitBreakerConfig::default()
            }
        );
    }
}
