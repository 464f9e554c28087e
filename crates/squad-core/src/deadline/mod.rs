//! Idle and total deadlines for one agent execution.
//!
//! Both deadlines derive from a nominal timeout `T`:
//! - idle: `max(idle_floor, T)`, pushed forward on every output line;
//! - total: `max(total_floor, total_multiplier * T)`, fixed at start.
//!
//! The [`supervise`] loop races the process's output queue against both.

pub mod supervisor;

pub use supervisor::{POLL_INTERVAL, SupervisionOutcome, supervise};

use std::time::Duration;

use tokio::time::Instant;

use crate::agent::FailureCause;

/// Constants that turn a nominal timeout into concrete deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub idle_floor: Duration,
    pub total_floor: Duration,
    pub total_multiplier: u32,
    pub retry_floor: Duration,
    pub retry_multiplier: u32,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            idle_floor: Duration::from_secs(20),
            total_floor: Duration::from_secs(60),
            total_multiplier: 4,
            retry_floor: Duration::from_secs(120),
            retry_multiplier: 2,
        }
    }
}

impl TimeoutPolicy {
    pub fn idle_timeout(&self, nominal: Duration) -> Duration {
        nominal.max(self.idle_floor)
    }

    pub fn total_timeout(&self, nominal: Duration) -> Duration {
        nominal
            .saturating_mul(self.total_multiplier)
            .max(self.total_floor)
    }

    /// The nominal timeout used for the one-shot retry after a timeout.
    pub fn retry_timeout(&self, nominal: Duration) -> Duration {
        nominal
            .saturating_mul(self.retry_multiplier)
            .max(self.retry_floor)
    }
}

/// Which deadline was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    Idle,
    Total,
}

/// Running deadline state for one execution.
#[derive(Debug, Clone)]
pub struct Deadlines {
    idle_timeout: Duration,
    total_timeout: Duration,
    idle_deadline: Instant,
    total_deadline: Instant,
}

impl Deadlines {
    pub fn start(policy: &TimeoutPolicy, nominal: Duration, now: Instant) -> Self {
        let idle_timeout = policy.idle_timeout(nominal);
        let total_timeout = policy.total_timeout(nominal);
        Self {
            idle_timeout,
            total_timeout,
            idle_deadline: now + idle_timeout,
            total_deadline: now + total_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn total_timeout(&self) -> Duration {
        self.total_timeout
    }

    /// Record output activity: the idle deadline moves to `now + idle`.
    pub fn touch(&mut self, now: Instant) {
        self.idle_deadline = now + self.idle_timeout;
    }

    /// The breached deadline at `now`, if any. Total wins over idle.
    pub fn check(&self, now: Instant) -> Option<Breach> {
        if now > self.total_deadline {
            Some(Breach::Total)
        } else if now > self.idle_deadline {
            Some(Breach::Idle)
        } else {
            None
        }
    }

    /// The failure cause reported for `breach`.
    pub fn cause(&self, breach: Breach) -> FailureCause {
        match breach {
            Breach::Idle => FailureCause::IdleTimeout {
                after: self.idle_timeout,
            },
            Breach::Total => FailureCause::TotalTimeout {
                after: self.total_timeout,
            },
        }
    }
}
