//! Deadline composition for async operations
//!
//! [`with_timeout`] hands the operation a signal that fires on the deadline
//! or on external cancellation, and stops waiting as soon as either happens.
//! Cancellation is cooperative: the wrapper drops the operation future, but
//! work the operation spawned elsewhere only stops if it observes the signal.

use super::signal::{combine_signals, AbortController, AbortSignal};
use crate::error::{wrap_error, BoxError, ResilienceError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Race `operation` against a deadline and an optional external signal
///
/// On expiry the signal given to the operation fires with a timeout error,
/// which is also returned. On external cancellation the external abort
/// reason is returned. Operation failures are wrapped into the taxonomy.
pub async fn with_timeout<F, Fut, T, E>(
    operation: F,
    timeout: Duration,
    external: Option<&AbortSignal>,
) -> Result<T>
where
    F: FnOnce(AbortSignal) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    with_timeout_named("operation", operation, timeout, external).await
}

/// [`with_timeout`] reporting `operation_name` in the timeout error
pub async fn with_timeout_named<F, Fut, T, E>(
    operation_name: &str,
    operation: F,
    timeout: Duration,
    external: Option<&AbortSignal>,
) -> Result<T>
where
    F: FnOnce(AbortSignal) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    let deadline = AbortController::new();
    let signal = combine_signals(
        std::iter::once(deadline.signal()).chain(external.cloned()),
    );
    signal.check()?;

    let operation = operation(signal.clone());

    // The deadline sleep lives inside the race and is dropped on every exit
    tokio::select! {
        biased;

        outcome = operation => outcome.map_err(wrap_error),
        reason = signal.aborted() => {
            debug!(code = reason.code(), "operation aborted before completion");
            Err(reason)
        }
        _ = tokio::time::sleep(timeout) => {
            let error = ResilienceError::timeout(operation_name, timeout);
            deadline.abort(error.clone());
            debug!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "operation timed out"
            );
            Err(error)
        }
    }
}
