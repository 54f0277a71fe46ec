//! Backoff policy for idempotent reads.
//!
//! Only history fetches are retried.  Writes (login, register, send) never are: a repeated
//! user action is the only way to re-issue them.

use std::time::Duration;

/// Number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry; each later retry doubles it.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Exponential backoff: retry `k` (zero-based) waits `base_delay * 2^k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given ceiling and base delay.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Sets the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Retries allowed after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after `failed_attempts` consecutive failures, or `None` once the ceiling is
    /// reached.
    pub fn delay_after(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts == 0 || failed_attempts > self.max_retries {
            return None;
        }
        let exponent = failed_attempts - 1;
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}
