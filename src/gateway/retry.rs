//! Retry policy and the bounded backoff executor.

use crate::core::ConfigError;
use crate::gateway::cancel::CancelScope;

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const MAX_JITTER_FRACTION: f64 = 1.0 - f64::EPSILON;

/// Bounded retry with exponential backoff and jitter.
///
/// The policy is immutable once built and can be shared freely. It knows
/// nothing about circuit breakers: a whole retry loop is one call as far as
/// a breaker is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts; 1 disables retries.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound for any single delay, before jitter.
    pub max_delay: Duration,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Random spread applied to each delay, in `[0, 1)`.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    /// Sets the jitter fraction.
    pub fn with_jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = if fraction.is_finite() {
            fraction.clamp(0.0, MAX_JITTER_FRACTION)
        } else {
            0.0
        };
        self
    }

    /// Checks the policy for values the executor can't honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "max_attempts",
            });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "backoff_multiplier",
                reason: format!("{} is not a finite value >= 1", self.backoff_multiplier),
            });
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            return Err(ConfigError::OutOfRange {
                field: "jitter_fraction",
                reason: format!("{} is outside [0, 1)", self.jitter_fraction),
            });
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::OutOfRange {
                field: "max_delay",
                reason: format!(
                    "{:?} is shorter than initial_delay {:?}",
                    self.max_delay, self.initial_delay
                ),
            });
        }
        Ok(())
    }

    /// Returns whether another attempt may follow attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// The pre-jitter delay after failed attempt `attempt` (1-indexed):
    /// `min(initial_delay * multiplier^(attempt - 1), max_delay)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());

        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// The delay after failed attempt `attempt`, with jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.base_delay(attempt), &mut rand::thread_rng())
    }

    /// Scales `delay` by a random factor in
    /// `[1 - jitter_fraction, 1 + jitter_fraction]`.
    pub fn apply_jitter(&self, delay: Duration, rng: &mut impl Rng) -> Duration {
        if self.jitter_fraction <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = self.jitter_fraction.min(MAX_JITTER_FRACTION);
        let factor = 1.0 + rng.gen_range(-spread..=spread);
        let jittered = (delay.as_secs_f64() * factor).max(0.0);
        Duration::try_from_secs_f64(jittered).unwrap_or(delay)
    }

    /// Runs `work` until it succeeds, fails permanently, runs out of
    /// attempts, or `scope` fires.
    ///
    /// `is_retryable` classifies each error; a `false` answer ends the loop
    /// at once. When the scope fires mid-attempt the attempt's future is
    /// dropped and the scope's token is cancelled so the work can observe it.
    pub async fn execute<T, E, F, Fut, P>(
        &self,
        mut work: F,
        is_retryable: P,
        scope: &CancelScope,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let started = Instant::now();
        let mut attempt = 0;
        let mut last_error: Option<E> = None;

        loop {
            if scope.is_fired() {
                scope.cancel();
                return RetryOutcome::finish(
                    Err(RetryError::Cancelled { last_error }),
                    attempt,
                    started,
                );
            }

            attempt += 1;
            let context = Attempt {
                number: attempt,
                cancellation: scope.token().clone(),
            };

            let result = tokio::select! {
                biased;
                _ = scope.fired() => {
                    scope.cancel();
                    tracing::debug!(attempt = attempt, "Attempt cancelled");
                    return RetryOutcome::finish(
                        Err(RetryError::Cancelled { last_error }),
                        attempt,
                        started,
                    );
                }
                result = work(context) => result,
            };

            let error = match result {
                Ok(value) => return RetryOutcome::finish(Ok(value), attempt, started),
                Err(error) => error,
            };

            if !is_retryable(&error) {
                return RetryOutcome::finish(
                    Err(RetryError::NonRetryable(error)),
                    attempt,
                    started,
                );
            }

            if !self.should_retry(attempt) {
                return RetryOutcome::finish(Err(RetryError::Exhausted(error)), attempt, started);
            }

            let delay = self.delay_for_attempt(attempt);
            tracing::debug!(
                attempt = attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation"
            );
            last_error = Some(error);

            tokio::select! {
                biased;
                _ = scope.fired() => {
                    scope.cancel();
                    return RetryOutcome::finish(
                        Err(RetryError::Cancelled { last_error }),
                        attempt,
                        started,
                    );
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Context handed to each attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-indexed attempt number.
    pub number: u32,
    /// Cancelled when the caller's deadline or token fires.
    pub cancellation: CancellationToken,
}

impl Attempt {
    /// Returns `true` if this is a retry rather than the first attempt.
    pub fn is_retry(&self) -> bool {
        self.number > 1
    }
}

/// Why a retry loop ended without a value.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The predicate classified the error as permanent.
    #[error("non-retryable error: {0}")]
    NonRetryable(E),

    /// Every attempt failed; carries the last error.
    #[error("retries exhausted: {0}")]
    Exhausted(E),

    /// The scope fired before the loop finished.
    #[error("retry loop cancelled")]
    Cancelled {
        /// The error from the last completed attempt, if any.
        last_error: Option<E>,
    },
}

/// The result of [`RetryPolicy::execute`].
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// The value, or why there is none.
    pub result: Result<T, RetryError<E>>,
    /// Attempts started.
    pub attempts: u32,
    /// Total time spent, including backoff.
    pub elapsed: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    fn finish(result: Result<T, RetryError<E>>, attempts: u32, started: Instant) -> Self {
        Self {
            result,
            attempts,
            elapsed: started.elapsed(),
        }
    }

    /// Returns `true` if the loop produced a value.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
