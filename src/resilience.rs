//! Resilience utilities: backoff schedule and the retry loop.
//!
//! Every collaborator call that can fail transiently (source reconnects,
//! checkpoint reads/writes, bulk publishes) goes through a [`BackoffPolicy`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> search_sync::Result<()> {
//! use search_sync::resilience::BackoffPolicy;
//!
//! let policy = BackoffPolicy::default();
//! let value = policy
//!     .retry("checkpoint_get", || async { Ok::<_, search_sync::SyncError>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SyncError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff with a ceiling and half-jitter.
///
/// The unjittered delay for attempt `n` (1-indexed inside [`retry`](Self::retry))
/// is `min(ceiling, base * factor^n)`. The slept delay is drawn uniformly from
/// `[clamped / 2, clamped]`, so concurrent retries spread out while still
/// waiting at least half the schedule.
///
/// # Default Schedule
///
/// ```text
/// Attempt  Clamped   Slept (range)
/// -------  -------   -------------
/// 1        200ms     100ms - 200ms
/// 2        400ms     200ms - 400ms
/// 3        800ms     400ms - 800ms
/// ...
/// 9        51.2s     25.6s - 51.2s
/// 10+      100s      50s - 100s (capped)
/// ```
///
/// After `max_attempts` guarded attempts the operation is tried exactly once
/// more and that result, success or error, is returned as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Growth factor per attempt (e.g. 2.0 = double each time).
    pub factor: f64,

    /// Upper bound for any single delay.
    pub ceiling: Duration,

    /// Guarded attempts before the final unguarded one.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            factor: 2.0,
            ceiling: Duration::from_secs(100),
            max_attempts: 100,
        }
    }
}

impl BackoffPolicy {
    /// Fast-fail schedule for tests.
    pub fn testing() -> Self {
        Self {
            base: Duration::from_millis(1),
            factor: 2.0,
            ceiling: Duration::from_millis(10),
            max_attempts: 3,
        }
    }

    /// No waiting and no guarded attempts: the operation runs once.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            factor: 1.0,
            ceiling: Duration::ZERO,
            max_attempts: 0,
        }
    }

    /// Unjittered delay for an attempt: `min(ceiling, base * factor^attempt)`.
    pub fn clamped_delay(&self, attempt: u32) -> Duration {
        let secs = self.base.as_secs_f64() * self.factor.powf(f64::from(attempt));
        if !secs.is_finite() || secs >= self.ceiling.as_secs_f64() {
            return self.ceiling;
        }
        if secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(secs)
    }

    /// Jittered delay for an attempt, using the thread-local RNG.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(&mut rand::thread_rng(), attempt)
    }

    /// Jittered delay: `half + U(0, half)` where `half = clamped / 2`.
    pub fn next_delay_with<R: Rng + ?Sized>(&self, rng: &mut R, attempt: u32) -> Duration {
        let half = self.clamped_delay(attempt) / 2;
        half + half.mul_f64(rng.gen::<f64>())
    }

    /// Handle a failed attempt: sleep and return `Ok(())` when another
    /// attempt should follow, otherwise hand the error back.
    ///
    /// Attempts `1..=max_attempts` are guarded. Attempt `max_attempts + 1`
    /// is the final one; its error is returned even when retryable. This is
    /// the schedule shared by [`retry`](Self::retry) and the source session.
    pub async fn back_off(&self, operation: &str, attempt: u32, error: SyncError) -> Result<()> {
        if !error.is_retryable() {
            return Err(error);
        }
        if attempt > self.max_attempts {
            warn!(operation, attempts = attempt, error = %error, "Retries exhausted");
            crate::metrics::record_retries_exhausted(operation);
            return Err(error);
        }

        let delay = self.next_delay(attempt);
        warn!(
            operation,
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure, backing off"
        );
        crate::metrics::record_retry(operation, error.kind());
        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Run `f` until it succeeds or fails with a non-retryable error.
    ///
    /// Retryable failures sleep [`next_delay`](Self::next_delay) and try
    /// again, up to `max_attempts` times. The last call is unguarded: its
    /// error propagates even when retryable.
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => self.back_off(operation, attempt, e).await?,
            }
            attempt = attempt.saturating_add(1);
        }
    }
}
