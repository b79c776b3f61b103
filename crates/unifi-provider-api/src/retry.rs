//! Retry policy and executor for controller calls.
//!
//! A [`RetryPolicy`] is a plain value (attempt budget, base delay, growth
//! factor, ceiling, jitter mode). [`RetryPolicy::run`] drives one logical
//! call through it, checking the caller's [`CancellationToken`] before every
//! attempt and while sleeping between attempts. Cancellation also drops an
//! attempt that is still in flight; the caller cannot tell whether it reached
//! the controller.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;

/// How the backoff delay is spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// `uniform(0, ceiling)` for each delay.
    #[default]
    Full,
    /// Exact exponential schedule. Used where timing must be predictable.
    None,
}

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Delay ceiling before the first retry.
    pub base_delay: Duration,
    /// Growth per retry.
    pub factor: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: Jitter::Full,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff ceiling after the `retry`-th failure (0-based):
    /// `min(max_delay, base_delay * factor^retry)`.
    pub fn ceiling(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Concrete delay to sleep after the `retry`-th failure.
    pub fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry);
        match self.jitter {
            Jitter::None => ceiling,
            Jitter::Full => {
                let secs = rand::thread_rng().gen_range(0.0..=ceiling.as_secs_f64());
                Duration::from_secs_f64(secs)
            }
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `op` receives the 1-based attempt number. `retryable` decides whether
    /// a failure may be retried; non-retryable errors are returned as-is.
    /// Exhausting the budget yields [`Error::RetriesExhausted`].
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        retryable: impl Fn(&Error) -> bool,
    ) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            // An in-flight attempt is dropped on cancellation.
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                result = op(attempt) => result,
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !retryable(&err) {
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %err, "retry budget exhausted");
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let mut delay = self.delay(attempt - 1);
            if let Error::RateLimited {
                retry_after_secs: Some(secs),
            } = err
            {
                delay = delay.max(Duration::from_secs(secs)).min(self.max_delay);
            }
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure, backing off"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
            factor: 2.0,
            max_delay: Duration::from_secs(1),
            jitter: Jitter::None,
        }
    }

    fn server_error() -> Error {
        Error::Http {
            status: 500,
            message: "boom".into(),
        }
    }

    #[test]
    fn default_policy_matches_documented_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.ceiling(0), Duration::from_millis(500));
        assert_eq!(policy.ceiling(1), Duration::from_millis(1000));
        assert_eq!(policy.ceiling(2), Duration::from_millis(2000));
    }

    #[test]
    fn ceiling_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.ceiling(10), Duration::from_secs(3));
        assert_eq!(policy.ceiling(u32::MAX), Duration::from_secs(3));
    }

    #[test]
    fn full_jitter_stays_under_ceiling() {
        let policy = RetryPolicy::default();
        for retry in 0..8 {
            assert!(policy.delay(retry) <= policy.ceiling(retry));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let cancel = CancellationToken::new();

        let result = fast_policy()
            .run(
                &cancel,
                |attempt| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(server_error())
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                Error::is_transient,
            )
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let cancel = CancellationToken::new();

        let result: Result<(), Error> = fast_policy()
            .run(
                &cancel,
                |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err(Error::LegacyApi {
                            message: "api.err.InvalidValue".into(),
                            field: None,
                            status: 400,
                        })
                    }
                },
                Error::is_transient,
            )
            .await;

        assert!(matches!(result, Err(Error::LegacyApi { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempt_count() {
        let cancel = CancellationToken::new();
        let result: Result<(), Error> = fast_policy()
            .run(&cancel, |_| async { Err(server_error()) }, Error::is_transient)
            .await;

        match result {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, Error::Http { status: 500, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(60),
            ..fast_policy()
        };

        let result: Result<(), Error> = policy
            .run(
                &cancel,
                |_| {
                    trigger.cancel();
                    async { Err(server_error()) }
                },
                Error::is_transient,
            )
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_token_prevents_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> = fast_policy()
            .run(
                &cancel,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                Error::is_transient,
            )
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drops_an_attempt_in_flight() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let finished = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&finished);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let result: Result<(), Error> = fast_policy()
            .run(
                &cancel,
                |_| {
                    let seen = Arc::clone(&seen);
                    async move {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                Error::is_transient,
            )
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
