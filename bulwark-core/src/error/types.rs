//! Core error types for Bulwark
//!
//! This module contains the `ResilienceError` struct, its classification enums
//! and the associated type aliases for Result types.
//!
//! Every error family (validation, network, ...) shares one flat struct and is
//! told apart by its [`ErrorKind`] tag. Kind-specific defaults for severity,
//! category, status code and retryability live in [`ErrorKind::defaults`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Any error crossing into the taxonomy from outside
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured context attached to an error
pub type ErrorContextMap = HashMap<String, serde_json::Value>;

pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Error severity levels for logging and escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Expected, user-caused or cosmetic failures
    Low,
    /// Failures that degrade a single operation
    Medium,
    /// Failures that degrade a component
    High,
    /// Failures that require process-level escalation
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Error classification for observability and handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Validation,
    Configuration,
    Network,
    Permission,
    Resource,
    BusinessLogic,
    Integration,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Network => "network",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Resource => "resource",
            ErrorCategory::BusinessLogic => "business-logic",
            ErrorCategory::Integration => "integration",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Discriminant for the error families of the taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Generic or wrapped foreign error
    Generic,
    Validation,
    Configuration,
    Network,
    Permission,
    Resource,
    BusinessLogic,
    Integration,
    /// Aggregate of several errors
    Multiple,
}

/// Defaults a kind applies when the caller does not override them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDefaults {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub status_code: u16,
    pub retryable: bool,
    pub code: &'static str,
}

impl ErrorKind {
    /// Default classification for errors of this kind
    pub fn defaults(self) -> KindDefaults {
        use ErrorCategory as C;
        use ErrorSeverity as S;

        let (category, severity, status_code, retryable, code) = match self {
            ErrorKind::Generic => (C::Unknown, S::Medium, 500, false, "UNKNOWN_ERROR"),
            ErrorKind::Validation => (C::Validation, S::Low, 400, false, "VALIDATION_ERROR"),
            ErrorKind::Configuration => {
                (C::Configuration, S::High, 500, false, "CONFIGURATION_ERROR")
            }
            ErrorKind::Network => (C::Network, S::Medium, 503, true, "NETWORK_ERROR"),
            ErrorKind::Permission => (C::Permission, S::Medium, 403, false, "PERMISSION_DENIED"),
            ErrorKind::Resource => (C::Resource, S::Medium, 404, false, "RESOURCE_ERROR"),
            ErrorKind::BusinessLogic => {
                (C::BusinessLogic, S::Medium, 422, false, "BUSINESS_LOGIC_ERROR")
            }
            ErrorKind::Integration => (C::Integration, S::High, 502, true, "INTEGRATION_ERROR"),
            ErrorKind::Multiple => (C::Unknown, S::Medium, 500, false, "MULTIPLE_ERRORS"),
        };

        KindDefaults {
            category,
            severity,
            status_code,
            retryable,
            code,
        }
    }

    /// Type name used in internal snapshots
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Generic => "GenericError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Permission => "PermissionError",
            ErrorKind::Resource => "ResourceError",
            ErrorKind::BusinessLogic => "BusinessLogicError",
            ErrorKind::Integration => "IntegrationError",
            ErrorKind::Multiple => "MultiError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The causal predecessor of an error
#[derive(Debug, Clone, Error)]
pub enum ErrorCause {
    /// Another taxonomy error
    #[error(transparent)]
    Error(Box<ResilienceError>),
    /// A foreign error that is not part of the taxonomy
    #[error(transparent)]
    Native(Arc<dyn std::error::Error + Send + Sync>),
}

impl ErrorCause {
    /// Wrap a foreign error as a cause
    pub fn native<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ErrorCause::Native(Arc::new(error))
    }
}

impl From<ResilienceError> for ErrorCause {
    fn from(error: ResilienceError) -> Self {
        ErrorCause::Error(Box::new(error))
    }
}

impl From<BoxError> for ErrorCause {
    fn from(error: BoxError) -> Self {
        match error.downcast::<ResilienceError>() {
            Ok(taxonomy) => ErrorCause::Error(taxonomy),
            Err(native) => ErrorCause::Native(Arc::from(native)),
        }
    }
}

/// Optional overrides accepted when constructing an error
#[derive(Debug, Clone, Default)]
pub struct ErrorOptions {
    pub cause: Option<ErrorCause>,
    pub severity: Option<ErrorSeverity>,
    pub category: Option<ErrorCategory>,
    pub retryable: Option<bool>,
    pub status_code: Option<u16>,
    pub code: Option<String>,
    pub context: ErrorContextMap,
}

impl ErrorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cause(mut self, cause: impl Into<ErrorCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Structured error carrying identity, classification and causal chain
///
/// Instances are immutable once built; the `with_*` methods consume the error
/// and return an updated copy that keeps the same identifier.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct ResilienceError {
    pub(crate) id: Uuid,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) kind: ErrorKind,
    pub(crate) message: String,
    pub(crate) code: String,
    pub(crate) severity: ErrorSeverity,
    pub(crate) category: ErrorCategory,
    pub(crate) retryable: bool,
    pub(crate) status_code: u16,
    pub(crate) context: ErrorContextMap,
    pub(crate) stack: Option<Arc<str>>,
    #[source]
    pub(crate) cause: Option<ErrorCause>,
    pub(crate) errors: Vec<ResilienceError>,
}

impl ResilienceError {
    /// Create a generic error from a message and options
    pub fn new(message: impl Into<String>, options: ErrorOptions) -> Self {
        Self::with_kind(ErrorKind::Generic, message, options)
    }

    /// Create an error of the given kind, applying kind defaults
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>, options: ErrorOptions) -> Self {
        let defaults = kind.defaults();
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            code: options.code.unwrap_or_else(|| defaults.code.to_string()),
            severity: options.severity.unwrap_or(defaults.severity),
            category: options.category.unwrap_or(defaults.category),
            retryable: options.retryable.unwrap_or(defaults.retryable),
            status_code: options.status_code.unwrap_or(defaults.status_code),
            context: options.context,
            stack: capture_stack(),
            cause: options.cause,
            errors: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn context(&self) -> &ErrorContextMap {
        &self.context
    }

    /// Captured stack, present only when backtraces are enabled
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// Member errors of a multi-error; empty for every other kind
    pub fn errors(&self) -> &[ResilienceError] {
        &self.errors
    }

    /// Attach a context entry, keeping the error's identity
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge a context map, keeping the error's identity
    pub fn with_context_map(mut self, context: ErrorContextMap) -> Self {
        self.context.extend(context);
        self
    }
}

fn capture_stack() -> Option<Arc<str>> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(Arc::from(backtrace.to_string())),
        _ => None,
    }
}

/// Helper function to format multiple errors
pub fn format_errors(errors: &[ResilienceError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("; ")
}
