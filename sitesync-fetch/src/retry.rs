//! One retry/backoff policy for every upstream request.
//!
//! The delay before retry `k` (1-based) is `min(base * 2^(k-1), max)`.

use std::fmt;
use std::thread;
use std::time::Duration;

use sitesync_core::config::RetrySettings;

/// Status codes worth retrying: request timeout, rate limiting, server errors.
pub fn default_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// What one attempt produced.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    /// Transient failure; try again if attempts remain.
    Retry(E),
    /// Permanent failure; stop immediately.
    Fail(E),
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug)]
pub enum RetryFailure<E> {
    Exhausted { attempts: u32, last: E },
    Fatal(E),
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryFailure::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            RetryFailure::Fatal(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable_status: fn(u16) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            retryable_status: default_retryable_status,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            retryable_status: default_retryable_status,
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        (self.retryable_status)(status)
    }

    /// Backoff before the retry that follows failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Drive `op` until it succeeds, fails permanently, or runs out of
    /// attempts. `ctx` is threaded through both callbacks so callers can keep
    /// their counters in one place; `on_retry` runs before each backoff sleep.
    pub fn run<S, T, E, Op, OnRetry>(
        &self,
        ctx: &mut S,
        mut op: Op,
        mut on_retry: OnRetry,
    ) -> Result<T, RetryFailure<E>>
    where
        Op: FnMut(&mut S, u32) -> Attempt<T, E>,
        OnRetry: FnMut(&mut S, u32, &E),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(ctx, attempt) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(err) => return Err(RetryFailure::Fatal(err)),
                Attempt::Retry(err) => {
                    if attempt >= self.max_attempts {
                        return Err(RetryFailure::Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    on_retry(ctx, attempt, &err);
                    let delay = self.delay_for(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            retryable_status: default_retryable_status,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn retryable_statuses() {
        assert!(default_retryable_status(502));
        assert!(default_retryable_status(503));
        assert!(default_retryable_status(429));
        assert!(!default_retryable_status(400));
        assert!(!default_retryable_status(404));
        assert!(!default_retryable_status(200));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::immediate(3);
        let mut retries = 0u32;
        let result: Result<&str, RetryFailure<&str>> = policy.run(
            &mut retries,
            |_, attempt| {
                if attempt < 3 {
                    Attempt::Retry("busy")
                } else {
                    Attempt::Done("ok")
                }
            },
            |retries, _, _| *retries += 1,
        );
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(retries, 2);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let policy = RetryPolicy::immediate(2);
        let mut calls = 0u32;
        let result: Result<(), RetryFailure<&str>> = policy.run(
            &mut calls,
            |calls, _| {
                *calls += 1;
                Attempt::Retry("down")
            },
            |_, _, _| {},
        );
        match result {
            Err(RetryFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, "down");
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
        assert_eq!(calls, 2);
    }

    #[test]
    fn fatal_stops_immediately() {
        let policy = RetryPolicy::immediate(5);
        let mut calls = 0u32;
        let result: Result<(), RetryFailure<&str>> = policy.run(
            &mut calls,
            |calls, _| {
                *calls += 1;
                Attempt::Fail("bad url")
            },
            |_, _, _| {},
        );
        assert!(matches!(result, Err(RetryFailure::Fatal("bad url"))));
        assert_eq!(calls, 1);
    }
}
