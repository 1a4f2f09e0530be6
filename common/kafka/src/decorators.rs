//! Composable handler wrappers: retry, timeout, circuit breaker, execution-time logging.
//!
//! Grounded on hook-common's `RetryPolicy` for the backoff shape, and the trade-forge
//! Python `decorators.py` for decorator composition and the circuit breaker's state
//! machine. The portable form here is a chain of handler-wrapping functions rather than
//! a language-level annotation: `retry(timeout(circuit_breaker(handler)))`.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::ProcessingError;

/// Exponential-ish backoff schedule for `RetryableError`: `delays[attempt - 1]`, clamped
/// to the last element once `attempt` runs past the list.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    pub max_attempts: u32,
    delays: Vec<Duration>,
}

impl RetrySchedule {
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        assert!(!delays.is_empty(), "retry schedule needs at least one delay");
        Self {
            max_attempts,
            delays,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).saturating_sub(1).min(self.delays.len() - 1);
        self.delays[idx]
    }
}

/// Wraps a future with a deadline. On expiry returns `ProcessingError::Retryable` so an
/// outer retry decorator treats it like any other transient failure.
pub async fn timeout<Fut>(duration: Duration, fut: Fut) -> Result<(), ProcessingError>
where
    Fut: Future<Output = Result<(), ProcessingError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProcessingError::Retryable(format!(
            "handler timed out after {duration:?}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// CLOSED -> OPEN on `failure_threshold` consecutive failures; OPEN -> HALF_OPEN once
/// `recovery_timeout` has elapsed since opening; HALF_OPEN -> CLOSED on one success,
/// back to OPEN on one failure.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    consecutive_failures: AtomicU32,
    state: Mutex<BreakerState>,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            consecutive_failures: AtomicU32::new(0),
            state: Mutex::new(BreakerState::Closed),
            opened_at: Mutex::new(None),
        }
    }

    fn poll_state(&self) -> BreakerState {
        let mut state = self.state.lock().unwrap();
        if *state == BreakerState::Open {
            let elapsed_enough = self
                .opened_at
                .lock()
                .unwrap()
                .map(|at| at.elapsed() >= self.recovery_timeout)
                .unwrap_or(false);
            if elapsed_enough {
                *state = BreakerState::HalfOpen;
            }
        }
        *state
    }

    pub async fn run<Fut>(&self, fut: Fut) -> Result<(), ProcessingError>
    where
        Fut: Future<Output = Result<(), ProcessingError>>,
    {
        if self.poll_state() == BreakerState::Open {
            let retry_after = self
                .opened_at
                .lock()
                .unwrap()
                .map(|at| self.recovery_timeout.saturating_sub(at.elapsed()))
                .unwrap_or(self.recovery_timeout);
            return Err(ProcessingError::CircuitBreakerOpen { retry_after });
        }

        let was_half_open = self.poll_state() == BreakerState::HalfOpen;
        match fut.await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                *self.state.lock().unwrap() = BreakerState::Closed;
                Ok(())
            }
            Err(error) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if was_half_open || failures >= self.failure_threshold {
                    *self.state.lock().unwrap() = BreakerState::Open;
                    *self.opened_at.lock().unwrap() = Some(Instant::now());
                    warn!(failures, "circuit breaker opened");
                }
                Err(error)
            }
        }
    }
}

/// Logs a warning if `fut` runs longer than `threshold`. Never alters the result.
pub async fn log_execution_time<Fut, T>(label: &str, threshold: Duration, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let started = Instant::now();
    let result = fut.await;
    let elapsed = started.elapsed();
    if elapsed >= threshold {
        warn!(label, ?elapsed, ?threshold, "handler exceeded execution time threshold");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_schedule_clamps_to_last_delay() {
        let schedule = RetrySchedule::new(5, vec![Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(15)]);
        assert_eq!(schedule.delay_for(1), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(3), Duration::from_secs(15));
        assert_eq!(schedule.delay_for(10), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_and_recovers() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));

        let fail = || async { Err(ProcessingError::Retryable("boom".into())) };
        assert!(breaker.run(fail()).await.is_err());
        assert!(breaker.run(fail()).await.is_err());

        // now open: next call is rejected without invoking the handler
        let rejected = breaker
            .run(async { panic!("handler must not run while breaker is open") })
            .await;
        assert!(matches!(rejected, Err(ProcessingError::CircuitBreakerOpen { .. })));

        tokio::time::sleep(Duration::from_millis(25)).await;

        // half-open: one success closes it again
        let ok = breaker.run(async { Ok(()) }).await;
        assert!(ok.is_ok());
        assert!(breaker.run(async { Ok(()) }).await.is_ok());
    }
}
