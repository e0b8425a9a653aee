//! Reconnection backoff policy.
//!
//! Provides the portable, sync-only pieces of reconnection; the timer that
//! realizes each delay lives in the connection manager.
//!
//! - [`ReconnectPolicy`]: base delay and attempt ceiling
//! - [`calculate_backoff_delay`]: `base * 2^(attempt - 1)`
//! - [`Backoff`]: attempt counter walking a policy until it is exhausted

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default reconnection attempt ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Parameters of the exponential reconnection policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Delay before the first retry, in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Retries allowed before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for a 1-based retry number, or `None` past the ceiling.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff without jitter.
///
/// Formula: `base_delay_ms * 2^(attempt - 1)`, saturating. `attempt` is
/// 1-based; attempt 0 is treated as attempt 1.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(63);
    base_delay_ms.saturating_mul(1u64 << exponent)
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempt counter
// ─────────────────────────────────────────────────────────────────────────────

/// Attempt counter for one run of a [`ReconnectPolicy`].
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    /// Start a fresh counter.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Consume the next retry: returns its 1-based number and delay, or
    /// `None` once the ceiling has been reached. The counter does not move
    /// past the ceiling.
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        let attempt = self.attempts + 1;
        let delay = self.policy.delay_for_attempt(attempt)?;
        self.attempts = attempt;
        Some((attempt, delay))
    }

    /// Back to zero, so the next retry waits the base delay again.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Retries consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The policy being walked.
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
