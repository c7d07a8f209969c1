//! Bounded-attempt exponential backoff executor
//!
//! Generic over the operation and its error type so both the health probe
//! and any future backend call can share one retry discipline.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Backoff configuration. Delay for attempt n is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay scheduled after a failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Full sequence of delays a run may sleep through. There is no delay
    /// after the final attempt, so the schedule has `max_attempts - 1`
    /// entries.
    pub fn delay_schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.delay_for(a)).collect()
    }
}

/// Classification of a single failed attempt.
///
/// `Fatal` errors (authorization rejections, contract bugs) propagate
/// immediately; only `Transient` failures are retried.
#[derive(Debug)]
pub enum AttemptError<E> {
    Transient(E),
    Fatal(E),
}

/// Terminal outcome of a retried operation that never succeeded.
#[derive(Debug)]
pub enum RetryError<E> {
    /// All attempts failed; carries the last transient error.
    Exhausted { attempts: u32, last: E },
    /// A non-retryable failure surfaced on some attempt.
    Fatal(E),
    /// The caller cancelled the run; no completion was delivered.
    Cancelled,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryError::Fatal(e) => write!(f, "non-retryable failure: {}", e),
            RetryError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Executes operations under a `RetryPolicy` with cooperative cancellation.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails fatally, runs out of attempts, or
    /// the token is cancelled.
    ///
    /// The operation receives the 1-based attempt number. Cancellation is
    /// checked before every attempt and races every backoff sleep, so a
    /// cancelled run never invokes `op` again and never sleeps out its
    /// remaining schedule.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
        E: std::fmt::Display,
    {
        let max = self.policy.max_attempts.max(1);

        for attempt in 1..=max {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(RetryError::Fatal(e)),
                Err(AttemptError::Transient(e)) => {
                    if attempt == max {
                        return Err(RetryError::Exhausted { attempts: max, last: e });
                    }

                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, backing off"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    }
                }
            }
        }

        unreachable!("loop returns on every path")
    }
}
