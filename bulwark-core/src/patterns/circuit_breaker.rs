//! Circuit Breaker Pattern for Fault Tolerance
//!
//! The circuit breaker stops calling a dependency that keeps failing, giving
//! it a cooldown period to heal instead of piling more work on it.
//!
//! ## States
//!
//! - **Closed**: normal operation. Failures are recorded with their time and
//!   the circuit opens once `failure_threshold` of them fall inside
//!   `time_window`.
//! - **Open**: every call is rejected with a `CIRCUIT_OPEN` error without
//!   running the operation, until `cooldown_period` has passed since the last
//!   failure. The next call then moves the circuit to half-open.
//! - **Half-Open**: calls pass through as probes. A single failure reopens the
//!   circuit; `success_threshold` consecutive successes close it and clear
//!   the failure history.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::time::Duration;
//! use bulwark_core::patterns::CircuitBreakerBuilder;
//!
//! # async fn example() -> bulwark_core::error::Result<()> {
//! let breaker = CircuitBreakerBuilder::new("billing-api")
//!     .failure_threshold(5)
//!     .cooldown_period(Duration::from_secs(30))
//!     .build();
//!
//! let invoice = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>("INV-1042".to_string()) })
//!     .await?;
//! assert_eq!(invoice, "INV-1042");
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use super::retry::{retry, RetryConfig};
use super::signal::AbortSignal;
use crate::config::defaults;
use crate::error::{wrap_error, BoxError, ResilienceError, Result};
use crate::observability::breaker_span;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing fast - requests are rejected immediately
    Open,
    /// Probing whether the dependency has recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures inside `time_window` that open the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit
    pub success_threshold: u32,
    /// Rolling window failures are counted in
    pub time_window: Duration,
    /// Time after the last failure before a probe is allowed
    pub cooldown_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::DEFAULT_BREAKER_FAILURE_THRESHOLD,
            success_threshold: defaults::DEFAULT_BREAKER_SUCCESS_THRESHOLD,
            time_window: defaults::DEFAULT_BREAKER_TIME_WINDOW,
            cooldown_period: defaults::DEFAULT_BREAKER_COOLDOWN,
        }
    }
}

/// Point-in-time view of a circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    /// Failures currently inside the rolling window
    pub recent_failures: u32,
    /// Consecutive successes while half-open
    pub consecutive_successes: u32,
    /// Calls that reached the operation
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    pub last_failure_at: Option<Instant>,
    pub last_state_change_at: Instant,
    /// Failed share of calls that reached the operation (0.0 - 1.0)
    pub failure_rate: f64,
}

struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
    state_changed_at: Instant,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            consecutive_successes: 0,
            last_failure_at: None,
            state_changed_at: Instant::now(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
        }
    }

    fn transition(&mut self, name: &str, to: CircuitState, now: Instant) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.state_changed_at = now;
        self.consecutive_successes = 0;
        match to {
            CircuitState::Open => warn!(circuit = name, %from, %to, "Circuit breaker opened"),
            CircuitState::HalfOpen => info!(circuit = name, %from, %to, "Circuit breaker probing"),
            CircuitState::Closed => info!(circuit = name, %from, %to, "Circuit breaker closed"),
        }
    }

    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) < window {
                break;
            }
            self.failures.pop_front();
        }
    }

    /// Cooldown is measured from the last failure, or from the transition
    /// when the circuit was opened by hand
    fn remaining_cooldown(&self, cooldown: Duration, now: Instant) -> Duration {
        let anchor = self
            .last_failure_at
            .map_or(self.state_changed_at, |failed| failed.max(self.state_changed_at));
        cooldown.saturating_sub(now.duration_since(anchor))
    }
}

/// Circuit breaker guarding one family of operations
///
/// Clones share state, so a breaker can be handed to every caller of the
/// dependency it protects.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name.into()),
            config,
            inner: Arc::new(Mutex::new(BreakerInner::new())),
        }
    }

    /// Get the name of this circuit breaker
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation through the circuit breaker
    ///
    /// While open the operation is not invoked and a `CIRCUIT_OPEN` error is
    /// returned. Otherwise the operation's outcome is returned, with foreign
    /// errors wrapped into the taxonomy.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        self.acquire()?;

        let outcome = operation()
            .instrument(breaker_span(&self.name))
            .await
            .map_err(wrap_error);

        match &outcome {
            Ok(_) => self.on_success(),
            Err(error) => self.on_failure(error),
        }
        outcome
    }

    /// Admit a call or reject it while the cooldown runs
    fn acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if inner.state == CircuitState::Open {
            let remaining = inner.remaining_cooldown(self.config.cooldown_period, now);
            if !remaining.is_zero() {
                inner.rejected_calls += 1;
                debug!(
                    circuit = %self.name,
                    remaining_ms = remaining.as_millis() as u64,
                    "Circuit breaker rejected call"
                );
                return Err(ResilienceError::circuit_open(self.name.as_ref(), remaining));
            }
            inner.transition(&self.name, CircuitState::HalfOpen, now);
        }

        inner.total_calls += 1;
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.successful_calls += 1;

        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                inner.failures.clear();
                inner.transition(&self.name, CircuitState::Closed, now);
            }
        }
    }

    fn on_failure(&self, error: &ResilienceError) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.failed_calls += 1;
        inner.last_failure_at = Some(now);
        inner.failures.push_back(now);
        inner.prune(self.config.time_window, now);

        match inner.state {
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, code = error.code(), "Probe failed while half-open");
                inner.transition(&self.name, CircuitState::Open, now);
            }
            CircuitState::Closed => {
                let recent = inner.failures.len() as u32;
                debug!(circuit = %self.name, recent, code = error.code(), "Circuit breaker recorded failure");
                if recent >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker '{}' opening after {} failures within {:?}",
                        self.name, recent, self.config.time_window
                    );
                    inner.transition(&self.name, CircuitState::Open, now);
                }
            }
            // A call admitted before the circuit opened; its failure only
            // extends the cooldown
            CircuitState::Open => {}
        }
    }

    /// Get the current state of the circuit breaker
    ///
    /// An open circuit reports `Open` until a call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get current circuit breaker statistics
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let now = Instant::now();
        let recent_failures = inner
            .failures
            .iter()
            .filter(|failed| now.duration_since(**failed) < self.config.time_window)
            .count() as u32;
        let failure_rate = if inner.total_calls > 0 {
            inner.failed_calls as f64 / inner.total_calls as f64
        } else {
            0.0
        };

        CircuitBreakerStats {
            state: inner.state,
            recent_failures,
            consecutive_successes: inner.consecutive_successes,
            total_calls: inner.total_calls,
            successful_calls: inner.successful_calls,
            failed_calls: inner.failed_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_at: inner.last_failure_at,
            last_state_change_at: inner.state_changed_at,
            failure_rate,
        }
    }

    /// Force the breaker closed and clear every counter
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = BreakerInner::new();
        info!(circuit = %self.name, "Circuit breaker reset");
    }

    /// Force the circuit breaker to open (for maintenance or emergency)
    ///
    /// The cooldown starts now.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.transition(&self.name, CircuitState::Open, now);
        inner.state_changed_at = now;
    }
}

/// Circuit breaker builder for easier configuration
#[derive(Debug)]
pub struct CircuitBreakerBuilder {
    name: String,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig::default(),
        }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn time_window(mut self, window: Duration) -> Self {
        self.config.time_window = window;
        self
    }

    pub fn cooldown_period(mut self, cooldown: Duration) -> Self {
        self.config.cooldown_period = cooldown;
        self
    }

    pub fn config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.name, self.config)
    }
}

/// Run a whole retry sequence as a single circuit breaker call
///
/// Exhausting the retries counts as one breaker failure.
pub async fn retry_with_circuit_breaker<F, Fut, T, E>(
    breaker: &CircuitBreaker,
    config: &RetryConfig,
    operation: F,
) -> Result<T>
where
    F: FnMut(AbortSignal) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    breaker.execute(|| retry(config, operation)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::advance;

    async fn fail(breaker: &CircuitBreaker) -> Result<i32> {
        breaker
            .execute(|| async { Err::<i32, _>(ResilienceError::network("upstream down")) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<i32> {
        breaker.execute(|| async { Ok::<_, ResilienceError>(42) }).await
    }

    fn breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreakerBuilder::new("test")
            .failure_threshold(failure_threshold)
            .success_threshold(2)
            .time_window(Duration::from_secs(60))
            .cooldown_period(Duration::from_secs(30))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_closed_state() {
        let breaker = breaker(3);

        for _ in 0..5 {
            assert_eq!(succeed(&breaker).await.unwrap(), 42);
        }

        assert_eq!(breaker.state(), CircuitState::Closed);
        let stats = breaker.stats();
        assert_eq!(stats.successful_calls, 5);
        assert_eq!(stats.failed_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_opens_on_failures() {
        let breaker = breaker(5);

        for i in 0..5 {
            let err = fail(&breaker).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Network);
            if i < 4 {
                assert_eq!(breaker.state(), CircuitState::Closed);
            }
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.stats().recent_failures, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_do_not_trip() {
        let breaker = breaker(3);

        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        advance(Duration::from_secs(61)).await;
        fail(&breaker).await.unwrap_err();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().recent_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_rejects_when_open() {
        let breaker = breaker(2);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        let invoked = AtomicU32::new(0);
        advance(Duration::from_secs(10)).await;
        let err = breaker
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ResilienceError>(42)
            })
            .await
            .unwrap_err();

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(err.code(), "CIRCUIT_OPEN");
        assert_eq!(err.context()["circuit"], "test");
        assert_eq!(err.context()["remaining_cooldown_ms"], 20_000);
        assert_eq!(breaker.stats().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_transition_after_cooldown() {
        let breaker = breaker(2);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        advance(Duration::from_secs(31)).await;
        assert_eq!(succeed(&breaker).await.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert_eq!(succeed(&breaker).await.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().recent_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker(2);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        advance(Duration::from_secs(31)).await;
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();

        assert_eq!(breaker.state(), CircuitState::Open);
        let err = succeed(&breaker).await.unwrap_err();
        assert_eq!(err.code(), "CIRCUIT_OPEN");
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_clears_failure_history() {
        let breaker = breaker(2);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        advance(Duration::from_secs(31)).await;
        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();

        // One new failure must not reopen a freshly closed circuit
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_everything() {
        let breaker = breaker(1);
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.total_calls, 0);
        assert_eq!(stats.recent_failures, 0);
        assert!(stats.last_failure_at.is_none());
        assert_eq!(succeed(&breaker).await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_open_starts_cooldown() {
        let breaker = breaker(5);
        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(succeed(&breaker).await.is_err());

        advance(Duration::from_secs(30)).await;
        assert!(succeed(&breaker).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_stats() {
        let breaker = breaker(2);
        for _ in 0..3 {
            succeed(&breaker).await.unwrap();
        }
        for _ in 0..2 {
            fail(&breaker).await.unwrap_err();
        }

        let stats = breaker.stats();
        assert_eq!(stats.total_calls, 5);
        assert_eq!(stats.successful_calls, 3);
        assert_eq!(stats.failed_calls, 2);
        assert_eq!(stats.failure_rate, 0.4);
        assert_eq!(stats.state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_state() {
        let breaker = breaker(1);
        let other = breaker.clone();
        fail(&other).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_counts_as_one_failure() {
        let breaker = breaker(2);
        let config = RetryConfig::fixed(4, Duration::from_millis(10));
        let attempts = Arc::new(AtomicU32::new(0));

        let err = retry_with_circuit_breaker(&breaker, &config, |_signal| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ResilienceError::network("flaky")) }
        })
        .await
        .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(err.context()["attempts"], 4);
        assert_eq!(breaker.stats().failed_calls, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(serde_json::to_string(&CircuitState::Open).unwrap(), "\"OPEN\"");
    }
}
