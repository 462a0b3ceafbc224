//! Per-user request quotas, checked before a relay is started.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::RelayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl QuotaDecision {
    /// `Denied` becomes [`RelayError::QuotaExceeded`].
    pub fn into_result(self) -> Result<(), RelayError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied { retry_after } => Err(RelayError::QuotaExceeded { retry_after }),
        }
    }
}

pub trait RateLimiter: Send + Sync {
    fn try_acquire(&self, user_id: &str) -> QuotaDecision;
}

/// Lets every request through.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn try_acquire(&self, _user_id: &str) -> QuotaDecision {
        QuotaDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
        }
    }
}

impl QuotaConfig {
    /// A zero limit or zero window turns quotas off.
    pub fn is_disabled(&self) -> bool {
        self.max_requests == 0 || self.window.is_zero()
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Counts requests per user in fixed windows that start at the user's first
/// request.
pub struct FixedWindowLimiter {
    config: QuotaConfig,
    windows: DashMap<String, Window>,
}

impl FixedWindowLimiter {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> QuotaConfig {
        self.config
    }

    pub(crate) fn try_acquire_at(&self, user_id: &str, now: Instant) -> QuotaDecision {
        if self.config.is_disabled() {
            return QuotaDecision::Allowed;
        }
        let mut window = self
            .windows
            .entry(user_id.to_string())
            .or_insert_with(|| Window {
                started: now,
                used: 0,
            });
        if now.saturating_duration_since(window.started) >= self.config.window {
            window.started = now;
            window.used = 0;
        }
        if window.used < self.config.max_requests {
            window.used += 1;
            return QuotaDecision::Allowed;
        }
        let retry_after = (window.started + self.config.window).saturating_duration_since(now);
        debug!(user_id, used = window.used, retry_after_ms = retry_after.as_millis() as u64, "quota exhausted");
        QuotaDecision::Denied { retry_after }
    }

    /// Drops windows that have fully elapsed.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn try_acquire(&self, user_id: &str) -> QuotaDecision {
        self.try_acquire_at(user_id, Instant::now())
    }
}
