//! Bounded retry policy shared by the upload and extraction stages.
//!
//! Each stage runs an explicit `for attempt in 0..max_attempts` loop and asks
//! the policy how long to wait and whether a timeout should trigger a more
//! aggressive recompression before the next try. Keeping the numbers here
//! rather than inline lets tests inject a zero-backoff policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times to try, how long to wait in between, and whether a
/// timeout escalates compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always ≥ 1.
    pub max_attempts: u32,
    /// Fixed delay before every retry.
    pub backoff: Duration,
    /// Recompress the source more aggressively after a timed-out attempt.
    pub escalate_on_timeout: bool,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            escalate_on_timeout: false,
        }
    }

    /// Three attempts, 2 s apart.
    pub const fn upload() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    /// Three attempts, 3 s apart, recompressing after a timeout.
    pub const fn extraction() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(3),
            escalate_on_timeout: true,
        }
    }

    /// Zero-delay variant, mostly useful in tests.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn with_escalation(mut self, on: bool) -> Self {
        self.escalate_on_timeout = on;
        self
    }

    /// Number of attempts actually made, clamping a misconfigured zero to one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether another attempt may follow attempt `attempt` (0-based).
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.attempts()
    }

    /// Delay before attempt `attempt` (0-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.backoff
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::extraction()
    }
}
