//! Exponential reconnect backoff

use std::time::Duration;

/// Reconnect policy for the broker connection
///
/// The delay before reconnect attempt `n` is `min(base_delay × 2^n, max_delay)`.
/// After `max_retries` scheduled reconnects a further failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            max_retries: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}
