//! Constructor methods and convenience functions for ResilienceError
//!
//! One shorthand per error kind, plus the derived errors produced by the
//! resilience patterns themselves (timeouts, cancellation, open circuits).

use super::types::{ErrorKind, ErrorOptions, ErrorSeverity, ResilienceError};
use std::time::Duration;

impl ResilienceError {
    /// Create a validation error (400, not retryable)
    ///
    /// # Examples
    /// ```rust
    /// use bulwark_core::error::{ErrorKind, ResilienceError};
    ///
    /// let err = ResilienceError::validation("email must contain '@'");
    /// assert_eq!(err.kind(), ErrorKind::Validation);
    /// assert_eq!(err.status_code(), 400);
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Validation, message, ErrorOptions::default())
    }

    /// Create a configuration error (500, high severity)
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Configuration, message, ErrorOptions::default())
    }

    /// Create a network error (503, retryable)
    pub fn network(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Network, message, ErrorOptions::default())
    }

    /// Create a permission error (403)
    pub fn permission(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Permission, message, ErrorOptions::default())
    }

    /// Create a resource error (404)
    pub fn resource(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Resource, message, ErrorOptions::default())
    }

    /// Create a business-logic error (422)
    pub fn business_logic(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::BusinessLogic, message, ErrorOptions::default())
    }

    /// Create an integration error (502, retryable)
    pub fn integration(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Integration, message, ErrorOptions::default())
    }

    /// Create the error reported when an operation exceeds its deadline
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        let operation = operation.into();
        let timeout_ms = duration.as_millis() as u64;
        Self::with_kind(
            ErrorKind::Network,
            format!("{} timed out after {}ms", operation, timeout_ms),
            ErrorOptions::new()
                .code("TIMEOUT")
                .status_code(504)
                .context("operation", operation)
                .context("timeout_ms", timeout_ms),
        )
    }

    /// Create the error reported when an operation is cancelled
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::with_kind(
            ErrorKind::Generic,
            message,
            ErrorOptions::new()
                .code("OPERATION_CANCELLED")
                .status_code(499)
                .retryable(false),
        )
    }

    /// Create the rejection returned by an open circuit breaker
    pub fn circuit_open(circuit: impl Into<String>, remaining_cooldown: Duration) -> Self {
        let circuit = circuit.into();
        let remaining_ms = remaining_cooldown.as_millis() as u64;
        Self::with_kind(
            ErrorKind::Resource,
            format!(
                "Circuit breaker '{}' is open, retry in {}ms",
                circuit, remaining_ms
            ),
            ErrorOptions::new()
                .code("CIRCUIT_OPEN")
                .status_code(503)
                .retryable(true)
                .context("circuit", circuit)
                .context("remaining_cooldown_ms", remaining_ms),
        )
    }

    /// Aggregate several errors into one multi-error
    ///
    /// Returns `None` for an empty list. The aggregate takes the highest
    /// member severity.
    pub fn multiple(message: impl Into<String>, errors: Vec<ResilienceError>) -> Option<Self> {
        let severity = errors.iter().map(|e| e.severity).max()?;
        let mut aggregate = Self::with_kind(
            ErrorKind::Multiple,
            message,
            ErrorOptions::new()
                .severity(severity)
                .context("error_count", errors.len()),
        );
        aggregate.errors = errors;
        Some(aggregate)
    }

    /// Member errors of the given kind, in their original order
    pub fn errors_of_kind(&self, kind: ErrorKind) -> Vec<&ResilienceError> {
        self.errors.iter().filter(|e| e.kind == kind).collect()
    }

    /// First member error of the given kind
    pub fn find_error(&self, kind: ErrorKind) -> Option<&ResilienceError> {
        self.errors.iter().find(|e| e.kind == kind)
    }

    /// Whether this is a critical error that should escalate
    pub fn is_critical(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }
}
