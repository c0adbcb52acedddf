//! Observability configuration for tracing
//!
//! This module installs the `tracing` subscriber, provides span helpers for
//! the resilience patterns and maps error severities onto log levels.

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingSettings};
use crate::error::{ErrorContextMap, ErrorSeverity, ResilienceError};

/// Initialize tracing with environment-based configuration
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with(&LoggingSettings::default())
}

/// Initialize tracing from logging settings
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing_with(settings: &LoggingSettings) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bulwark_core={}", settings.level)));

    let installed = match settings.format {
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init(),
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    installed.is_ok()
}

/// Create a span for a retry sequence
#[inline]
pub fn retry_span(operation: &str) -> Span {
    tracing::debug_span!(
        "retry",
        operation = %operation,
        attempts = tracing::field::Empty,
    )
}

/// Create a span for a call through a circuit breaker
#[inline]
pub fn breaker_span(circuit: &str) -> Span {
    tracing::debug_span!("circuit_breaker", circuit = %circuit)
}

/// Log levels used when reporting errors
///
/// `Fatal` has no `tracing` counterpart; it is emitted at error level with
/// `fatal = true` so subscribers can escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// CRITICAL escalates as fatal, HIGH is an error, MEDIUM a warning and
    /// LOW informational
    pub fn for_severity(severity: ErrorSeverity) -> Self {
        match severity {
            ErrorSeverity::Critical => LogLevel::Fatal,
            ErrorSeverity::High => LogLevel::Error,
            ErrorSeverity::Medium => LogLevel::Warn,
            ErrorSeverity::Low => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Report an error at the level derived from its severity
pub fn log_error(error: &ResilienceError, context: &ErrorContextMap) {
    let context = serde_json::to_string(context).unwrap_or_default();
    macro_rules! report {
        ($macro:ident $(, $field:ident = $value:expr)*) => {
            tracing::$macro!(
                error_id = %error.id(),
                code = error.code(),
                severity = %error.severity(),
                category = %error.category(),
                retryable = error.is_retryable(),
                context = %context,
                $($field = $value,)*
                "{}",
                error.message()
            )
        };
    }

    match LogLevel::for_severity(error.severity()) {
        LogLevel::Fatal => report!(error, fatal = true),
        LogLevel::Error => report!(error),
        LogLevel::Warn => report!(warn),
        LogLevel::Info => report!(info),
        LogLevel::Debug => report!(debug),
        LogLevel::Trace => report!(trace),
    }
}
