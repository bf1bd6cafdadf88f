use std::collections::BTreeSet;
use std::time::Duration;

use crate::errors::StreamError;

/// Status codes retried by [`RetryPolicy::defaults`].
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Exponential backoff configuration shared read-only across sessions.
///
/// `delay_for_attempt(n) = min(initial_delay * multiplier^(n-1), max_delay)`
/// for `n >= 1`; attempts below 1 get `initial_delay`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    retryable_status_codes: BTreeSet<u16>,
}

impl RetryPolicy {
    /// 3 retries, 1s initial delay, 30s cap, doubling, default status set.
    pub fn defaults() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }

    /// Same as [`RetryPolicy::defaults`] with `max_retries = 0`.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::defaults()
        }
    }

    /// Starts a builder seeded with the defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::defaults(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn retryable_status_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_status_codes
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt < 1 {
            return self.initial_delay;
        }
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let scaled_us = self.initial_delay.as_micros() as f64 * self.multiplier.powi(exponent);
        let max_us = self.max_delay.as_micros() as f64;
        // `as u64` saturates, so an infinite product lands on the cap.
        Duration::from_micros(scaled_us.min(max_us) as u64).min(self.max_delay)
    }

    /// True iff `status` is in the retryable set.
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Classifies an executor error: transport failures always retry,
    /// status errors retry by set membership, everything else never does.
    pub fn should_retry(&self, error: &StreamError) -> bool {
        match error {
            StreamError::Network { .. } => true,
            StreamError::HttpStatus { status, .. } => self.is_retryable(*status),
            _ => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Validating builder for [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Maximum number of retries after the first attempt (0 disables).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Growth factor per attempt; must be at least 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Replaces the retryable status set.
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.policy.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<RetryPolicy, StreamError> {
        let policy = self.policy;
        if !policy.multiplier.is_finite() || policy.multiplier < 1.0 {
            return Err(StreamError::Config(format!(
                "retry multiplier must be >= 1.0, got {}",
                policy.multiplier
            )));
        }
        if policy.initial_delay > policy.max_delay {
            return Err(StreamError::Config(
                "retry initial_delay must not exceed max_delay".into(),
            ));
        }
        Ok(policy)
    }
}
