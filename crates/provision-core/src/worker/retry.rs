//! Retry/backoff policy
//!
//! Redelivery delay grows exponentially with the attempt count:
//! `base_delay * multiplier^(attempts - 1)`, capped at `max_delay`. The
//! attempt budget is not part of the policy; every job carries its own.

use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff policy applied between deliveries of a failing job
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Growth factor per additional attempt
    pub multiplier: f64,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// A policy that retries immediately
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before redelivering a job that failed on attempt `attempts`
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
