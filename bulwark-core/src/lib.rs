//! Bulwark: resilience primitives and a structured error taxonomy
//!
//! - [`error`]: the [`ResilienceError`] type with kinds, severities, causal
//!   chains and JSON snapshots
//! - [`patterns`]: abort signals, timeouts, retry with backoff and circuit
//!   breaking
//! - [`context`]: error handler registry, recovery strategies and the error
//!   boundary
//! - [`config`] and [`observability`]: settings loading and tracing setup
//!
//! ```rust
//! use bulwark_core::{retry, RetryConfig, ResilienceError};
//!
//! # async fn example() -> bulwark_core::Result<()> {
//! let config = RetryConfig::default().with_max_attempts(5);
//! let body = retry(&config, |_signal| async {
//!     Ok::<_, ResilienceError>("pong")
//! })
//! .await?;
//! assert_eq!(body, "pong");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod patterns;

pub use config::ResilienceConfig;
pub use context::{BoundaryOptions, ErrorHandler, Fallback, ResilienceContext};
pub use error::{
    is_retryable_error, wrap_error, wrap_error_with, ErrorCategory, ErrorKind, ErrorOptions,
    ErrorSeverity, ResilienceError, Result,
};
pub use patterns::{
    combine_signals, retry, retry_with_circuit_breaker, with_timeout, AbortController,
    AbortSignal, CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig,
};
