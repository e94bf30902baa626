//! Bounded exponential backoff for rate-limited query attempts.
//!
//! [`RetryPolicy::next`] is a pure transition function: given the failed
//! attempt and its error, it says whether to wait and retry or to fail. The
//! orchestrator owns the actual sleeping, so the policy is testable without
//! a clock.

use std::time::Duration;

use tracing::warn;

use crate::config::RagConfig;
use crate::error::AgentError;

/// Largest exponent applied to the base wait.
const MAX_EXPONENT: u32 = 16;

/// Decision after a failed attempt.
#[derive(Debug)]
pub enum Transition {
    /// Wait, then start attempt `attempt`.
    Retry {
        /// Zero-based index of the next attempt.
        attempt: u32,
        /// Backoff before it.
        wait: Duration,
    },
    /// Stop and surface this error.
    Fail(AgentError),
}

/// Exponential backoff policy: waits `base_wait * 2^attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_wait: Duration,
    max_retries: u32,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries after the first
    /// attempt.
    #[must_use]
    pub const fn new(base_wait: Duration, max_retries: u32) -> Self {
        Self {
            base_wait,
            max_retries,
        }
    }

    /// Policy from configuration.
    #[must_use]
    pub const fn from_config(config: &RagConfig) -> Self {
        Self::new(config.base_wait, config.max_retries)
    }

    /// Retries allowed after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff after the zero-based `attempt` fails.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.base_wait.saturating_mul(factor)
    }

    /// Transition after the zero-based `attempt` failed with `error`.
    ///
    /// `waited` is the backoff already spent on this query, reported if
    /// retries run out.
    #[must_use]
    pub fn next(&self, attempt: u32, error: AgentError, waited: Duration) -> Transition {
        if !error.is_rate_limited() {
            return Transition::Fail(error);
        }

        if attempt >= self.max_retries {
            warn!(attempts = attempt + 1, "rate limited; retries exhausted");
            return Transition::Fail(AgentError::RetriesExhausted {
                attempts: attempt + 1,
                waited,
            });
        }

        let wait = self.delay_for_attempt(attempt);
        warn!(
            attempt = attempt + 1,
            max_attempts = self.max_retries + 1,
            wait_secs = wait.as_secs(),
            "rate limited; backing off"
        );
        Transition::Retry {
            attempt: attempt + 1,
            wait,
        }
    }
}
