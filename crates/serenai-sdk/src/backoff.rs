//! Reconnect backoff policy.
//!
//! Delay before automatic attempt `n` (1-indexed):
//!
//! ```text
//! delay(n) = min(base * 2^(n-1), max_delay)
//! ```
//!
//! With the defaults this yields 1s, 2s, 4s, 8s, 16s for attempts 1..=5,
//! after which the manager stops retrying on its own.

use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Default cap applied to every delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Default number of automatic retries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff parameters for automatic reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before attempt 1.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Automatic attempts allowed after a connection drops.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Delay to wait before automatic attempt `attempt` (1-indexed).
    ///
    /// Attempt `0` is treated as attempt `1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Whether another automatic attempt may follow `completed` failed ones.
    pub fn allows_retry_after(&self, completed: u32) -> bool {
        completed < self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
