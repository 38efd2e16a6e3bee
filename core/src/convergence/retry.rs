//! Retry policies for transient faults.
//!
//! Provides configurable retry behaviour with multiple backoff strategies
//! (fixed, linear, exponential). Used by connect-with-retry; the overall
//! deadline lives with the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// A retry policy that controls how many times an action may be retried and
/// how long to wait between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// `None` means retry until the caller's deadline.
    #[serde(default)]
    pub max_retries: Option<u32>,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl RetryPolicy {
    pub fn new(max_retries: Option<u32>, strategy: BackoffStrategy, base_delay_ms: u64) -> Self {
        RetryPolicy {
            max_retries,
            strategy,
            base_delay_ms,
            max_delay_ms: default_max_delay_ms(),
        }
    }

    /// Whether the given attempt number (0-indexed) is within the retry budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_retries {
            Some(max) => attempt < max,
            None => true,
        }
    }

    /// Compute the delay before the given attempt, capped at `max_delay_ms`.
    ///
    /// Attempt 0 is the first retry (after the initial failure).
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let raw = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(attempt as u64 + 1),
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt.min(32))),
        };
        raw.min(self.max_delay_ms)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}

impl Default for RetryPolicy {
    /// Default: unbounded retries, exponential backoff, 1000ms base delay.
    fn default() -> Self {
        RetryPolicy::new(None, BackoffStrategy::Exponential, 1000)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
