//! Cooperative cancellation signals
//!
//! An [`AbortController`] owns the firing side; any number of [`AbortSignal`]
//! clones observe it. A signal fires at most once and carries the
//! [`ResilienceError`] it was aborted with.
//!
//! [`combine_signals`] derives a signal that fires when the first of its
//! inputs fires. The combined signal is a view over its inputs: it spawns no
//! background task, so dropping it releases everything.

use crate::error::{ResilienceError, Result};
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;

/// Orders aborts across controllers so combined signals can tell which input
/// fired first
static ABORT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
struct AbortRecord {
    sequence: u64,
    reason: ResilienceError,
}

/// Firing side of a cancellation signal
#[derive(Debug)]
pub struct AbortController {
    sender: watch::Sender<Option<AbortRecord>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// A signal observing this controller
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            source: SignalSource::Controlled(self.sender.subscribe()),
        }
    }

    /// Fire the signal with `reason`
    ///
    /// Only the first call records a reason; returns whether this call fired.
    pub fn abort(&self, reason: ResilienceError) -> bool {
        self.sender.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(AbortRecord {
                sequence: ABORT_SEQUENCE.fetch_add(1, Ordering::SeqCst),
                reason,
            });
            true
        })
    }

    /// Fire the signal with a generic cancellation error
    pub fn cancel(&self) -> bool {
        self.abort(ResilienceError::cancelled("Operation was cancelled"))
    }

    pub fn is_aborted(&self) -> bool {
        self.sender.borrow().is_some()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
enum SignalSource {
    Never,
    Controlled(watch::Receiver<Option<AbortRecord>>),
    Any(Arc<Combined>),
}

/// Inputs of a combined signal and the first abort observed through them
#[derive(Debug)]
struct Combined {
    inputs: Box<[AbortSignal]>,
    fired: OnceLock<AbortRecord>,
}

/// Observing side of a cancellation signal
#[derive(Debug, Clone)]
pub struct AbortSignal {
    source: SignalSource,
}

impl AbortSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self {
            source: SignalSource::Never,
        }
    }

    /// Signal firing when the first of `signals` fires
    pub fn any<I>(signals: I) -> Self
    where
        I: IntoIterator<Item = AbortSignal>,
    {
        combine_signals(signals)
    }

    fn record(&self) -> Option<AbortRecord> {
        match &self.source {
            SignalSource::Never => None,
            SignalSource::Controlled(receiver) => receiver.borrow().clone(),
            SignalSource::Any(combined) => {
                if let Some(record) = combined.fired.get() {
                    return Some(record.clone());
                }
                // Latch so that an input publishing late with a lower
                // sequence cannot replace a reason already handed out
                let earliest = combined
                    .inputs
                    .iter()
                    .filter_map(AbortSignal::record)
                    .min_by_key(|record| record.sequence)?;
                Some(combined.fired.get_or_init(|| earliest).clone())
            }
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.record().is_some()
    }

    /// The abort reason, once fired
    pub fn reason(&self) -> Option<ResilienceError> {
        self.record().map(|record| record.reason)
    }

    /// Return the abort reason as an error if the signal has fired
    pub fn check(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Resolve with the abort reason once the signal fires
    ///
    /// Pending forever for a signal that can no longer fire.
    pub fn aborted(&self) -> BoxFuture<'_, ResilienceError> {
        async move {
            if let Some(record) = self.record() {
                return record.reason;
            }

            match &self.source {
                SignalSource::Never => {}
                SignalSource::Controlled(receiver) => {
                    let mut receiver = receiver.clone();
                    let reason = match receiver.wait_for(Option::is_some).await {
                        Ok(slot) => (*slot).as_ref().map(|record| record.reason.clone()),
                        // Controller dropped without firing
                        Err(_) => None,
                    };
                    if let Some(reason) = reason {
                        return reason;
                    }
                }
                SignalSource::Any(combined) if !combined.inputs.is_empty() => {
                    let (first, _, _) =
                        future::select_all(combined.inputs.iter().map(AbortSignal::aborted)).await;
                    return self.reason().unwrap_or(first);
                }
                SignalSource::Any(_) => {}
            }

            future::pending::<ResilienceError>().await
        }
        .boxed()
    }
}

/// Merge several signals into one
///
/// No inputs yields a signal that never fires and a single input is returned
/// unchanged. Otherwise the result fires with the reason of whichever input
/// fired first, immediately if one already has.
pub fn combine_signals<I>(signals: I) -> AbortSignal
where
    I: IntoIterator<Item = AbortSignal>,
{
    let mut signals: Vec<AbortSignal> = signals.into_iter().collect();
    match signals.len() {
        0 => AbortSignal::never(),
        1 => signals.pop().unwrap_or_else(AbortSignal::never),
        _ => AbortSignal {
            source: SignalSource::Any(Arc::new(Combined {
                inputs: signals.into_boxed_slice(),
                fired: OnceLock::new(),
            })),
        },
    }
}

/// Sleep for `duration`, returning the abort reason early if `signal` fires
pub async fn sleep_with_signal(duration: Duration, signal: Option<&AbortSignal>) -> Result<()> {
    let Some(signal) = signal else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    signal.check()?;
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        reason = signal.aborted() => Err(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn reason(code: &str) -> ResilienceError {
        ResilienceError::with_kind(
            crate::error::ErrorKind::Generic,
            format!("aborted by {}", code),
            crate::error::ErrorOptions::new().code(code),
        )
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let controller = AbortController::new();
        let signal = controller.signal();

        assert!(!signal.is_aborted());
        assert!(controller.abort(reason("FIRST")));
        assert!(!controller.abort(reason("SECOND")));

        assert_eq!(signal.reason().unwrap().code(), "FIRST");
        assert_eq!(signal.aborted().await.code(), "FIRST");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_combination_never_fires() {
        let combined = combine_signals(Vec::new());
        assert!(!combined.is_aborted());
        assert!(timeout(Duration::from_secs(3600), combined.aborted()).await.is_err());
    }

    #[tokio::test]
    async fn test_single_signal_returned_unchanged() {
        let controller = AbortController::new();
        let combined = combine_signals([controller.signal()]);

        assert!(!combined.is_aborted());
        controller.abort(reason("ONLY"));
        assert_eq!(combined.reason().unwrap().code(), "ONLY");
    }

    #[tokio::test]
    async fn test_combined_fires_with_first_reason_once() {
        let a = AbortController::new();
        let b = AbortController::new();
        let combined = combine_signals([a.signal(), b.signal()]);

        let waiter = {
            let combined = combined.clone();
            tokio::spawn(async move { combined.aborted().await })
        };

        sleep(Duration::from_millis(5)).await;
        b.abort(reason("B"));
        a.abort(reason("A"));

        assert_eq!(waiter.await.unwrap().code(), "B");
        // Later fires of other inputs never change the outcome
        assert_eq!(combined.reason().unwrap().code(), "B");
    }

    #[tokio::test]
    async fn test_combined_reason_is_latched() {
        let a = AbortController::new();
        let b = AbortController::new();
        let combined = combine_signals([a.signal(), b.signal()]);

        b.abort(reason("B"));
        assert_eq!(combined.reason().unwrap().code(), "B");

        // `a` publishing late with an earlier sequence, as when two threads
        // abort concurrently
        a.sender.send_replace(Some(AbortRecord {
            sequence: 0,
            reason: reason("A"),
        }));

        assert_eq!(combined.reason().unwrap().code(), "B");
        assert_eq!(combined.aborted().await.code(), "B");
        assert_eq!(combined.clone().reason().unwrap().code(), "B");
    }

    #[tokio::test]
    async fn test_combined_with_already_fired_input() {
        let a = AbortController::new();
        let b = AbortController::new();
        a.abort(reason("EARLY"));

        let combined = combine_signals([b.signal(), a.signal()]);
        assert!(combined.is_aborted());
        assert_eq!(combined.aborted().await.code(), "EARLY");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_controller_never_fires() {
        let signal = {
            let controller = AbortController::new();
            controller.signal()
        };
        assert!(timeout(Duration::from_secs(60), signal.aborted()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_with_signal_aborts_early() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let started = tokio::time::Instant::now();

        let sleeper = tokio::spawn(async move {
            sleep_with_signal(Duration::from_secs(30), Some(&signal)).await
        });

        sleep(Duration::from_millis(100)).await;
        controller.cancel();

        let err = sleeper.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "OPERATION_CANCELLED");
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_with_signal_completes() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(sleep_with_signal(Duration::from_millis(50), Some(&signal)).await.is_ok());
        assert!(sleep_with_signal(Duration::from_millis(50), None).await.is_ok());
    }
}
