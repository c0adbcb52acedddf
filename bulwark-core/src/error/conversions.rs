//! Conversions from foreign errors into the taxonomy
//!
//! `wrap_error` is the boundary function: call it where a foreign error is
//! first caught, and the resulting taxonomy error then propagates unchanged.
//! The `From` implementations let `?` do the same for common I/O, runtime and
//! parsing errors.

use super::types::{BoxError, ErrorCause, ErrorKind, ErrorOptions, ResilienceError};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Message markers of transient network failures surfaced as plain text
const TRANSIENT_MARKERS: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "EPIPE",
    "ENOTFOUND",
    "EAI_AGAIN",
];

/// Wrap any error into the taxonomy
///
/// Taxonomy errors are returned unchanged, so wrapping is idempotent.
pub fn wrap_error<E>(error: E) -> ResilienceError
where
    E: Into<BoxError>,
{
    wrap_error_with(error, None, ErrorOptions::default())
}

/// Wrap any error into the taxonomy with an explicit message and options
///
/// The options only apply when a new error is created. The message defaults
/// to the display text of the wrapped error. Without an explicit `retryable`
/// option, a transient foreign error produces a retryable taxonomy error.
pub fn wrap_error_with<E>(error: E, message: Option<&str>, options: ErrorOptions) -> ResilienceError
where
    E: Into<BoxError>,
{
    let boxed: BoxError = error.into();
    match boxed.downcast::<ResilienceError>() {
        Ok(existing) => *existing,
        Err(native) => {
            let message = message
                .map(str::to_string)
                .unwrap_or_else(|| native.to_string());
            let retryable = options
                .retryable
                .or_else(|| is_transient_io_error(&*native).then_some(true));
            ResilienceError::new(
                message,
                ErrorOptions {
                    cause: Some(ErrorCause::Native(Arc::from(native))),
                    retryable,
                    ..options
                },
            )
        }
    }
}

/// Whether an error is worth retrying
///
/// Taxonomy errors answer with their `retryable` flag alone. Only bare
/// foreign errors go through the transient I/O heuristic.
pub fn is_retryable_error(error: &(dyn std::error::Error + 'static)) -> bool {
    if let Some(taxonomy) = error.downcast_ref::<ResilienceError>() {
        return taxonomy.is_retryable();
    }
    is_transient_io_error(error)
}

/// Narrow heuristic for transient I/O failures of foreign errors
pub fn is_transient_io_error(error: &(dyn std::error::Error + 'static)) -> bool {
    if let Some(io_error) = error.downcast_ref::<io::Error>() {
        if is_transient_io_kind(io_error.kind()) {
            return true;
        }
    }
    if error.is::<tokio::time::error::Elapsed>() {
        return true;
    }
    let message = error.to_string();
    TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
}

fn is_transient_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::Interrupted
    )
}

impl From<io::Error> for ResilienceError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            k if is_transient_io_kind(k) => ErrorKind::Network,
            io::ErrorKind::NotFound => ErrorKind::Resource,
            io::ErrorKind::PermissionDenied => ErrorKind::Permission,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::Validation,
            _ => ErrorKind::Generic,
        };
        let message = format!("I/O error: {}", err);
        ResilienceError::with_kind(kind, message, ErrorOptions::new().cause(ErrorCause::native(err)))
    }
}

impl From<tokio::time::error::Elapsed> for ResilienceError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ResilienceError::timeout("async_operation", Duration::ZERO)
    }
}

impl From<serde_json::Error> for ResilienceError {
    fn from(err: serde_json::Error) -> Self {
        ResilienceError::with_kind(
            ErrorKind::Validation,
            format!("Invalid JSON: {}", err),
            ErrorOptions::new()
                .code("INVALID_JSON")
                .cause(ErrorCause::native(err)),
        )
    }
}

impl From<toml::de::Error> for ResilienceError {
    fn from(err: toml::de::Error) -> Self {
        ResilienceError::with_kind(
            ErrorKind::Configuration,
            format!("Failed to parse TOML: {}", err),
            ErrorOptions::new()
                .code("INVALID_CONFIG")
                .cause(ErrorCause::native(err)),
        )
    }
}
