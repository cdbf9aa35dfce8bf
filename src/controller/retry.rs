//! Bounded retry for the role labeler
//!
//! The default policy retries every write error immediately, up to
//! [`DEFAULT_MAX_ATTEMPTS`] times. [`RetryPolicy::on_conflict`] opts into
//! retrying only conflict-class errors with jittered exponential backoff.

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

/// Default number of write attempts when labeling a pod
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Retry policy for read-modify-write loops against the API server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Backoff before the second attempt, doubled for every later attempt
    pub base_delay: Duration,
    /// Upper bound on a single backoff
    pub max_delay: Duration,
    /// Retry only conflict-class errors (409, 429, 5xx, transport)
    pub conflicts_only: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Retry any error without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            conflicts_only: false,
        }
    }

    /// Retry conflict-class errors only, with jittered exponential backoff
    pub fn on_conflict(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            conflicts_only: true,
        }
    }

    /// Whether a failed write should be attempted again
    pub fn should_retry(&self, err: &Error) -> bool {
        !self.conflicts_only || err.is_retriable()
    }

    /// Upper bound of the backoff after `attempt` failed attempts (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Full-jitter backoff: uniform in `[0, backoff_ceiling(attempt)]`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let millis = ceiling.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}
