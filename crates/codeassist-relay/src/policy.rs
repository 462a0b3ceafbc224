use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential retry policy applied to rate-limited provider attempts.
///
/// The delay before retry `n` (zero-based) is
/// `initial_delay_ms * backoff_multiplier^n`, with no jitter and no cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Growth factor per retry step.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    2_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }

    pub fn exponential(max_retries: u32, initial_delay_ms: u64, backoff_multiplier: f64) -> Self {
        let multiplier = if backoff_multiplier <= 0.0 {
            default_backoff_multiplier()
        } else {
            backoff_multiplier
        };
        Self {
            max_retries,
            initial_delay_ms,
            backoff_multiplier: multiplier,
        }
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay to wait after failed attempt `attempt` (zero-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(attempt as i32);
        let millis = (self.initial_delay_ms as f64 * exp).round();
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            return Duration::from_millis(u64::MAX);
        }
        Duration::from_millis(millis as u64)
    }
}
