//! Resilience patterns for Bulwark
//!
//! Cancellation signals, deadlines, retries and circuit breaking. Each
//! pattern reports failures through the error taxonomy in [`crate::error`].

pub mod circuit_breaker;
pub mod retry;
pub mod signal;
pub mod timeout;

pub use circuit_breaker::{
    retry_with_circuit_breaker, CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig,
    CircuitBreakerStats, CircuitState,
};
pub use retry::{apply_jitter, retry, OnRetryFn, RetryConfig, ShouldRetryFn, JITTER_RATIO};
pub use signal::{combine_signals, sleep_with_signal, AbortController, AbortSignal};
pub use timeout::{with_timeout, with_timeout_named};
