//! Error handler registry, recovery strategies and the error boundary
//!
//! A [`ResilienceContext`] holds named error handlers and recovery
//! strategies keyed by error code. It is cheap to clone and every clone
//! shares the same registries, so one context is usually built at startup
//! and handed to the components that report errors.
//!
//! Handlers observe errors; recovery strategies replace them with a value.
//! [`ResilienceContext::error_boundary`] ties both together with an optional
//! fallback.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::error::{wrap_error, BoxError, ErrorContextMap, ResilienceError, Result};
use crate::observability::log_error;

/// Observer notified of every error passed to
/// [`ResilienceContext::handle_error`]
///
/// Handlers run concurrently and in no particular order. A failing or
/// panicking handler is logged and does not affect the others.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(
        &self,
        error: &ResilienceError,
        context: &ErrorContextMap,
    ) -> std::result::Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut> ErrorHandler for F
where
    F: Fn(ResilienceError, ErrorContextMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    async fn handle(
        &self,
        error: &ResilienceError,
        context: &ErrorContextMap,
    ) -> std::result::Result<(), BoxError> {
        (self)(error.clone(), context.clone()).await
    }
}

type RecoveredValue = Box<dyn Any + Send>;
type RecoveryFuture = BoxFuture<'static, std::result::Result<Option<RecoveredValue>, BoxError>>;
type RecoveryFn = Arc<dyn Fn(ResilienceError) -> RecoveryFuture + Send + Sync>;

/// Value used by the error boundary when nothing recovered the failure
pub enum Fallback<T> {
    Value(T),
    /// Computed only when needed
    Compute(Box<dyn FnOnce() -> T + Send>),
}

impl<T> Fallback<T> {
    fn resolve(self) -> T {
        match self {
            Fallback::Value(value) => value,
            Fallback::Compute(compute) => compute(),
        }
    }
}

impl<T> fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::Value(_) => f.write_str("Fallback::Value(..)"),
            Fallback::Compute(_) => f.write_str("Fallback::Compute(<closure>)"),
        }
    }
}

/// Options for [`ResilienceContext::error_boundary`]
pub struct BoundaryOptions<T> {
    pub fallback: Option<Fallback<T>>,
    /// Replaces handler dispatch when set
    pub on_error: Option<Box<dyn FnOnce(&ResilienceError) + Send>>,
    /// Passed to the registered handlers
    pub context: Option<ErrorContextMap>,
}

impl<T> Default for BoundaryOptions<T> {
    fn default() -> Self {
        Self {
            fallback: None,
            on_error: None,
            context: None,
        }
    }
}

impl<T> BoundaryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback_value(mut self, value: T) -> Self {
        self.fallback = Some(Fallback::Value(value));
        self
    }

    pub fn fallback_with<F>(mut self, compute: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.fallback = Some(Fallback::Compute(Box::new(compute)));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&ResilienceError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn context(mut self, context: ErrorContextMap) -> Self {
        self.context = Some(context);
        self
    }
}

struct ContextInner {
    handlers: DashMap<String, Arc<dyn ErrorHandler>>,
    strategies: DashMap<String, RecoveryFn>,
}

/// Registry of error handlers and recovery strategies
#[derive(Clone)]
pub struct ResilienceContext {
    inner: Arc<ContextInner>,
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategies: Vec<String> = self
            .inner
            .strategies
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        f.debug_struct("ResilienceContext")
            .field("handlers", &self.handler_names())
            .field("strategies", &strategies)
            .finish()
    }
}

impl ResilienceContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                handlers: DashMap::new(),
                strategies: DashMap::new(),
            }),
        }
    }

    /// Register a handler under `name`, replacing any previous one
    pub fn register_error_handler<H>(&self, name: impl Into<String>, handler: H)
    where
        H: ErrorHandler + 'static,
    {
        let name = name.into();
        debug!(handler = %name, "Registered error handler");
        self.inner.handlers.insert(name, Arc::new(handler));
    }

    /// Returns whether a handler was registered under `name`
    pub fn unregister_error_handler(&self, name: &str) -> bool {
        self.inner.handlers.remove(name).is_some()
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Wrap, log and dispatch an error to every registered handler
    ///
    /// The error is logged at the level derived from its severity. All
    /// handlers are awaited; their failures are logged and swallowed. Returns
    /// the wrapped error.
    pub async fn handle_error<E>(&self, error: E, context: Option<ErrorContextMap>) -> ResilienceError
    where
        E: Into<BoxError>,
    {
        let error = wrap_error(error);
        let context = context.unwrap_or_default();
        log_error(&error, &context);

        // Snapshot the registry so no map guard is held across an await
        let handlers: Vec<(String, Arc<dyn ErrorHandler>)> = self
            .inner
            .handlers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let outcomes = join_all(handlers.iter().map(|(name, handler)| {
            let dispatch = AssertUnwindSafe(handler.handle(&error, &context)).catch_unwind();
            async move { (name, dispatch.await) }
        }))
        .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(handler = %name, error = %e, "Error handler failed"),
                Err(_) => warn!(handler = %name, "Error handler panicked"),
            }
        }

        error
    }

    /// Register a recovery strategy for errors with the given code
    ///
    /// The strategy resolves to `Ok(Some(value))` to recover, `Ok(None)` to
    /// decline and `Err` when recovery itself failed.
    pub fn register_recovery_strategy<F, Fut, T>(&self, code: impl Into<String>, strategy: F)
    where
        F: Fn(ResilienceError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<T>, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let code = code.into();
        let erased: RecoveryFn = Arc::new(move |error| {
            let attempt = strategy(error);
            async move {
                attempt
                    .await
                    .map(|value| value.map(|value| Box::new(value) as RecoveredValue))
            }
            .boxed()
        });
        debug!(code = %code, "Registered recovery strategy");
        self.inner.strategies.insert(code, erased);
    }

    /// Returns whether a strategy was registered for `code`
    pub fn unregister_recovery_strategy(&self, code: &str) -> bool {
        self.inner.strategies.remove(code).is_some()
    }

    pub fn has_recovery_strategy(&self, code: &str) -> bool {
        self.inner.strategies.contains_key(code)
    }

    /// Try to recover a value of type `T` from `error`
    ///
    /// Falls back to `default` when no strategy matches the error code, the
    /// strategy declines, fails, panics or produces a value of another type.
    pub async fn try_recover<T>(&self, error: &ResilienceError, default: Option<T>) -> Option<T>
    where
        T: 'static,
    {
        let strategy = match self.inner.strategies.get(error.code()) {
            Some(entry) => Arc::clone(entry.value()),
            None => return default,
        };

        let attempt = match std::panic::catch_unwind(AssertUnwindSafe(|| strategy(error.clone()))) {
            Ok(attempt) => attempt,
            Err(_) => {
                warn!(code = error.code(), "Recovery strategy panicked");
                return default;
            }
        };

        match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(Ok(Some(value))) => match value.downcast::<T>() {
                Ok(value) => {
                    info!(code = error.code(), error_id = %error.id(), "Recovered from error");
                    Some(*value)
                }
                Err(_) => {
                    warn!(
                        code = error.code(),
                        expected = std::any::type_name::<T>(),
                        "Recovery strategy produced a value of another type"
                    );
                    default
                }
            },
            Ok(Ok(None)) => {
                debug!(code = error.code(), "Recovery strategy declined");
                default
            }
            Ok(Err(e)) => {
                warn!(code = error.code(), error = %e, "Recovery strategy failed");
                default
            }
            Err(_) => {
                warn!(code = error.code(), "Recovery strategy panicked");
                default
            }
        }
    }

    /// Run `operation`, turning a failure into a recovered or fallback value
    ///
    /// On failure the error goes to `on_error` when given, otherwise through
    /// [`handle_error`](Self::handle_error). A recovery strategy for its code
    /// wins over the fallback; with neither, the wrapped error is returned.
    pub async fn error_boundary<F, Fut, T, E>(
        &self,
        operation: F,
        options: BoundaryOptions<T>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
        T: 'static,
    {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => wrap_error(error),
        };

        let BoundaryOptions {
            fallback,
            on_error,
            context,
        } = options;

        let error = match on_error {
            Some(on_error) => {
                on_error(&error);
                error
            }
            None => self.handle_error(error, context).await,
        };

        if let Some(recovered) = self.try_recover(&error, None).await {
            return Ok(recovered);
        }

        match fallback {
            Some(fallback) => {
                debug!(code = error.code(), "Using fallback after error");
                Ok(fallback.resolve())
            }
            None => Err(error),
        }
    }
}
