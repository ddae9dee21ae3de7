//! Backoff Module
//!
//! Tracks consecutive failed poll cycles and turns them into the wait
//! before the next one. The state is a plain value the poll loop threads
//! through each cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Scheduler health derived from the failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    pub consecutive_failures: u32,
    pub last_success: DateTime<Utc>,
}

impl BackoffState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            consecutive_failures: 0,
            last_success: now,
        }
    }

    pub fn health(&self) -> Health {
        match self.consecutive_failures {
            0 => Health::Healthy,
            n => Health::Degraded(n),
        }
    }

    pub fn record_success(self, now: DateTime<Utc>) -> Self {
        if self.consecutive_failures > 0 {
            info!(failures = self.consecutive_failures, "recovered after {} failures", self.consecutive_failures);
        }
        Self {
            consecutive_failures: 0,
            last_success: now,
        }
    }

    pub fn record_failure(self) -> Self {
        let failures = self.consecutive_failures.saturating_add(1);
        warn!(failures, "consecutive failures: {}", failures);
        Self {
            consecutive_failures: failures,
            ..self
        }
    }
}

/// Wait-time parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait between healthy cycles.
    pub base_interval: Duration,
    /// Unit multiplied by the exponential factor while degraded.
    pub unit: Duration,
    /// Largest factor applied to `unit`.
    pub cap: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            unit: Duration::from_secs(60),
            cap: 30,
        }
    }
}

impl BackoffPolicy {
    pub fn with_base_interval(mut self, base_interval: Duration) -> Self {
        self.base_interval = base_interval;
        self
    }

    /// `base_interval` when healthy, else `min(2^n, cap) * unit`, never
    /// shorter than `base_interval`.
    pub fn wait_time(&self, state: &BackoffState) -> Duration {
        match state.health() {
            Health::Healthy => self.base_interval,
            Health::Degraded(n) => {
                let factor = 1u64.checked_shl(n).unwrap_or(u64::MAX).min(u64::from(self.cap));
                let backoff = self.unit * factor as u32;
                backoff.max(self.base_interval)
            }
        }
    }

    /// Upper bound of [`wait_time`](Self::wait_time).
    pub fn max_wait(&self) -> Duration {
        (self.unit * self.cap).max(self.base_interval)
    }
}
