//! Bounded retry with linear backoff.
//!
//! A [`RetryPolicy`] runs an async operation up to `max_attempts` times.
//! After failed attempt `n` (except the last) it waits `base_delay * n`,
//! so a three-attempt policy with a 2s base waits 2s and then 4s.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Linear delay sequence: `base`, `2 * base`, `3 * base`, ...
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, attempt: 0 }
    }
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        Some(self.base * self.attempt)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the error of the final attempt
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: E,
    },

    /// The operation failed in a way another attempt cannot fix
    #[error("{operation} failed permanently on attempt {attempts}: {last}")]
    Permanent {
        operation: String,
        attempts: u32,
        last: E,
    },

    /// Cancellation fired during an attempt or while waiting to retry
    #[error("{operation} cancelled after {attempts} attempt(s)")]
    Cancelled { operation: String, attempts: u32 },
}

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A single attempt, no retry.
    pub fn once() -> Self {
        Self::linear(1, Duration::ZERO)
    }

    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff::new(self.base_delay)
    }

    /// Run `op` until it succeeds or attempts run out.
    ///
    /// `op` receives the 1-based attempt number and must build a fresh future
    /// for every attempt. Cancellation is checked after each failed attempt
    /// and during the wait; the operation itself is expected to honour the
    /// token it was handed.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation, cancel, |_: &E| true, op).await
    }

    /// Like [`run`](Self::run), but an error for which `retryable` returns
    /// false ends the loop at once with [`RetryError::Permanent`].
    pub async fn run_if<T, E, R, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        retryable: R,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        R: Fn(&E) -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if cancel.is_cancelled() {
                warn!(operation, attempt, error = %err, "Attempt interrupted: cancelled");
                return Err(RetryError::Cancelled {
                    operation: operation.to_string(),
                    attempts: attempt,
                });
            }

            if !retryable(&err) {
                error!(operation, attempt, error = %err, "Attempt failed, not retrying");
                return Err(RetryError::Permanent {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: err,
                });
            }

            error!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                error = %err,
                "Attempt {} failed",
                attempt
            );

            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = backoff.next_backoff().unwrap_or(self.base_delay);
            info!(operation, delay_ms = delay.as_millis() as u64, "Retrying in {:?}", delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(operation, attempt, "Retry abandoned: cancelled");
                    return Err(RetryError::Cancelled {
                        operation: operation.to_string(),
                        attempts: attempt,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Paused-clock sleeps land on millisecond ticks.
    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_linear_backoff_sequence() {
        let mut backoff = LinearBackoff::new(Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(6)));
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_policy_never_has_zero_attempts() {
        assert_eq!(RetryPolicy::linear(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::once().max_attempts, 1);
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures_with_linear_waits() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(2));
        let started = Instant::now();
        let stamps = Arc::new(std::sync::Mutex::new(Vec::new()));

        let stamps_op = stamps.clone();
        let result: Result<u32, RetryError<String>> = policy
            .run("test", &CancellationToken::new(), move |attempt| {
                let stamps = stamps_op.clone();
                async move {
                    stamps.lock().unwrap().push(started.elapsed());
                    if attempt < 3 {
                        Err(format!("failure {}", attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 3);
        assert_close(stamps[1] - stamps[0], Duration::from_secs(2));
        assert_close(stamps[2] - stamps[1], Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));

        let calls_op = calls.clone();
        let result: Result<(), RetryError<String>> = policy
            .run("upload", &CancellationToken::new(), move |attempt| {
                calls_op.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("boom {}", attempt)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "boom 3");
            }
            other => panic!("Expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_final_attempt() {
        let policy = RetryPolicy::linear(2, Duration::from_secs(10));
        let started = Instant::now();

        let _: Result<(), RetryError<&str>> = policy
            .run("op", &CancellationToken::new(), |_| async { Err("nope") })
            .await;

        assert_close(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_attempts() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = calls.clone();
        let result: Result<(), RetryError<&str>> = policy
            .run("op", &cancel, move |_| {
                calls_op.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(RetryError::Cancelled { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_final_attempt() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let result: Result<(), RetryError<&str>> = policy
            .run("upload", &cancel, move |attempt| {
                if attempt == 3 {
                    token.cancel();
                }
                async { Err("interrupted") }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Cancelled { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(60));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let calls_op = calls.clone();
        let result: Result<(), RetryError<String>> = policy
            .run_if(
                "upload",
                &CancellationToken::new(),
                |e: &String| !e.starts_with("fatal"),
                move |_| {
                    calls_op.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal: file vanished".to_string()) }
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        match result {
            Err(RetryError::Permanent { attempts, last, .. }) => {
                assert_eq!(attempts, 1);
                assert_eq!(last, "fatal: file vanished");
            }
            other => panic!("Expected permanent failure, got {:?}", other),
        }
    }
}
