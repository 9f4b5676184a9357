//! Bounded retry budget shared by image acquisition and zone re-sync.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after each failure, capped at `max`.
    Exponential { max: Duration },
}

/// What the caller should do after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Exhausted,
}

/// Counts failed attempts against a fixed budget.
///
/// `max_attempts` is the total number of attempts, the first one included:
/// with the default of 5 the fifth failure exhausts the budget and no sixth
/// attempt is scheduled. The budget only comes back through [`reset`].
///
/// [`reset`]: RetryPolicy::reset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
    failures: u32,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
            failures: 0,
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            delay: initial,
            backoff: Backoff::Exponential { max },
            failures: 0,
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Failed attempts since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.max_attempts
    }

    /// Records a failure and decides whether another attempt is allowed.
    pub fn record_failure(&mut self) -> RetryDecision {
        if self.is_exhausted() {
            return RetryDecision::Exhausted;
        }
        self.failures += 1;
        if self.failures >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.delay_for(self.failures))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    fn delay_for(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max } => {
                let shift = failures.saturating_sub(1).min(16);
                self.delay.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}
