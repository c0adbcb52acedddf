//! Default configuration values for Bulwark
//!
//! This module centralizes all default values to make them easy to find and modify.

use std::time::Duration;

// Retry defaults
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_RETRY_JITTER: bool = true;
pub const DEFAULT_RETRY_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

// Circuit breaker defaults
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_BREAKER_SUCCESS_THRESHOLD: u32 = 2;
pub const DEFAULT_BREAKER_TIME_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_BREAKER_COOLDOWN: Duration = Duration::from_secs(30);

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Levels accepted by the `logging.level` setting
pub const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
