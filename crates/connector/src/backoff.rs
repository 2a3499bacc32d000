//! Reconnect delay policy.

use std::time::Duration;

/// Exponential backoff: `base * 2^min(attempt, max_exponent)`.
///
/// `attempt` counts consecutive failures and is reset once a stream opens,
/// so a healthy connection that later drops starts again from `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max_exponent: u32,
    attempt: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(300), 6)
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max_exponent: u32) -> Self {
        Self {
            base,
            max_exponent,
            attempt: 0,
        }
    }

    /// Set the first delay.
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Set the exponent at which delays stop growing.
    pub fn with_max_exponent(mut self, max_exponent: u32) -> Self {
        self.max_exponent = max_exponent;
        self
    }

    /// Delay before the next attempt. Advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let multiplier = 2u32.saturating_pow(self.attempt.min(self.max_exponent));
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(multiplier)
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Largest delay this policy produces.
    pub fn max_delay(&self) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(self.max_exponent))
    }
}
