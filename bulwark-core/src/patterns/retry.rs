//! Retry with exponential backoff for handling transient failures
//!
//! Every attempt runs under its own deadline and observes the optional
//! external signal, so a retry sequence can be cancelled mid-attempt or
//! mid-delay. Attempts are strictly sequential.

use super::signal::{sleep_with_signal, AbortSignal};
use super::timeout::with_timeout_named;
use crate::config::defaults;
use crate::error::{is_retryable_error, BoxError, ResilienceError, Result};
use crate::observability::retry_span;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};

/// Fraction of the computed delay used as the jitter range in each direction
pub const JITTER_RATIO: f64 = 0.25;

/// Decides whether a failed attempt should be retried
pub type ShouldRetryFn = Arc<dyn Fn(&ResilienceError, u32) -> bool + Send + Sync>;

/// Observes each scheduled retry with the failure, attempt and delay
pub type OnRetryFn = Arc<dyn Fn(&ResilienceError, u32, Duration) + Send + Sync>;

/// Configuration for retry operations
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay, before jitter
    pub max_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_factor: f64,
    /// Randomly perturb delays by up to a quarter in either direction
    pub jitter: bool,
    /// Deadline for each individual attempt
    pub timeout: Duration,
    /// External cancellation for the whole sequence
    pub signal: Option<AbortSignal>,
    /// Retry eligibility; every failure is retried when unset
    pub should_retry: Option<ShouldRetryFn>,
    pub on_retry: Option<OnRetryFn>,
    /// Per-operation identifier for better observability
    pub operation_name: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_delay: defaults::DEFAULT_RETRY_INITIAL_DELAY,
            max_delay: defaults::DEFAULT_RETRY_MAX_DELAY,
            backoff_factor: defaults::DEFAULT_RETRY_BACKOFF_FACTOR,
            jitter: defaults::DEFAULT_RETRY_JITTER,
            timeout: defaults::DEFAULT_RETRY_ATTEMPT_TIMEOUT,
            signal: None,
            should_retry: None,
            on_retry: None,
            operation_name: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .field("signal", &self.signal.is_some())
            .field("should_retry", &self.should_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("operation_name", &self.operation_name)
            .finish()
    }
}

impl RetryConfig {
    /// Constant delay between attempts, without jitter
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
            jitter: false,
            ..Default::default()
        }
    }

    /// Exponential backoff with the default delays
    pub fn exponential(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Create retry config for network operations with optimized settings
    ///
    /// Only failures recognised by [`is_retryable_error`] are retried.
    pub fn for_network_operations(operation_name: &str) -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_factor: 1.6,
            timeout: Duration::from_secs(10),
            operation_name: Some(operation_name.to_string()),
            should_retry: Some(Arc::new(|error, _attempt| is_retryable_error(error))),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Set the per-attempt deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cancel the whole sequence when `signal` fires
    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    pub fn with_on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ResilienceError, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Set operation name for better observability
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Backoff delay scheduled after the failure of `attempt`, before jitter
    ///
    /// `min(max_delay, initial_delay * backoff_factor^(attempt - 1))`, floored
    /// to whole milliseconds.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0).floor() as u64)
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            apply_jitter(delay, &mut rand::thread_rng())
        } else {
            delay
        }
    }

    fn allows_retry(&self, error: &ResilienceError, attempt: u32) -> bool {
        self.should_retry
            .as_ref()
            .map_or(true, |predicate| predicate(error, attempt))
    }
}

/// Perturb `delay` uniformly within [`JITTER_RATIO`] of its value
///
/// The result is floored to whole milliseconds and never negative.
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let delay_ms = delay.as_millis() as f64;
    let spread = delay_ms * JITTER_RATIO;
    if !(spread > 0.0) {
        return delay;
    }
    let jittered = delay_ms + rng.gen_range(-spread..=spread);
    Duration::from_millis(jittered.max(0.0).floor() as u64)
}

/// Retry an async operation with the given configuration
///
/// The operation receives the signal of its attempt, which fires on the
/// attempt deadline or on external cancellation. Once attempts are exhausted
/// or the predicate declines, the last failure is returned with `attempts`
/// and `elapsed_ms` added to its context. External cancellation returns the
/// abort reason as is.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: FnMut(AbortSignal) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    let operation_name = config.operation_name.as_deref().unwrap_or("operation");
    run_attempts(config, operation_name, operation)
        .instrument(retry_span(operation_name))
        .await
}

async fn run_attempts<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(AbortSignal) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    let max_attempts = config.max_attempts.max(1);
    let signal = config.signal.as_ref();
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        Span::current().record("attempts", attempt);
        if let Some(signal) = signal {
            signal.check()?;
        }

        debug!(attempt, max_attempts, "starting attempt");
        let outcome =
            with_timeout_named(operation_name, &mut operation, config.timeout, signal).await;
        let error = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempts = attempt, "{} succeeded after retry", operation_name);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if signal.map_or(false, AbortSignal::is_aborted) {
            debug!(attempt, code = error.code(), "retry sequence cancelled");
            return Err(error);
        }

        let exhausted = attempt >= max_attempts;
        if exhausted || !config.allows_retry(&error, attempt) {
            if exhausted {
                warn!(
                    "Max retry attempts ({}) reached for {}: {}",
                    max_attempts, operation_name, error
                );
            } else {
                debug!("Error is not retryable: {}", error);
            }
            return Err(error
                .with_context("attempts", attempt)
                .with_context("elapsed_ms", started.elapsed().as_millis() as u64));
        }

        let delay = config.next_delay(attempt);
        if let Some(on_retry) = &config.on_retry {
            on_retry(&error, attempt, delay);
        }
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            code = error.code(),
            "Retry attempt {}/{} for {} after error: {}",
            attempt,
            max_attempts,
            operation_name,
            error
        );

        sleep_with_signal(delay, signal).await?;
    }
}
