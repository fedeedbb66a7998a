//! Reconnect backoff policy.
//!
//! Three failure classes back off independently: network faults reconnect
//! quickly and linearly, HTTP errors back off exponentially, and rate limiting
//! backs off exponentially from a much larger start. The attempt budget counts
//! every reconnect since the last successful connection.

use std::time::Duration;

/// Delay schedule for one failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `start + step * (attempt - 1)`, capped at `max`
    Linear {
        start: Duration,
        step: Duration,
        max: Duration,
    },
    /// `start * factor^(attempt - 1)`, capped at `max`
    Exponential {
        start: Duration,
        factor: u32,
        max: Duration,
    },
}

impl Backoff {
    /// Delay before the given 1-based attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let steps = attempt.saturating_sub(1);
        match *self {
            Backoff::Linear { start, step, max } => {
                start.saturating_add(step.saturating_mul(steps)).min(max)
            }
            Backoff::Exponential { start, factor, max } => {
                let multiplier = factor.max(1).saturating_pow(steps);
                start.saturating_mul(multiplier).min(max)
            }
        }
    }
}

/// Why the previous connection attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// TCP/TLS failure, read error, or the remote closing the body
    Network,
    /// Non-200 HTTP status other than rate limiting
    Http,
    /// HTTP 420 or 429
    RateLimited,
}

/// Backoff schedules and the reconnect budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub network: Backoff,
    pub http: Backoff,
    pub rate_limited: Backoff,
    /// Reconnects allowed since the last successful connection
    pub max_reconnects: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            network: Backoff::Linear {
                start: Duration::from_millis(250),
                step: Duration::from_millis(250),
                max: Duration::from_secs(16),
            },
            http: Backoff::Exponential {
                start: Duration::from_secs(5),
                factor: 2,
                max: Duration::from_secs(320),
            },
            rate_limited: Backoff::Exponential {
                start: Duration::from_secs(60),
                factor: 2,
                max: Duration::from_secs(960),
            },
            max_reconnects: 320,
        }
    }
}

impl ReconnectPolicy {
    /// Zero delays with a fixed budget. Useful in tests.
    pub fn immediate(max_reconnects: u32) -> Self {
        let none = Backoff::Linear {
            start: Duration::ZERO,
            step: Duration::ZERO,
            max: Duration::ZERO,
        };
        Self {
            network: none,
            http: none,
            rate_limited: none,
            max_reconnects,
        }
    }

    pub fn with_max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.max_reconnects = max_reconnects;
        self
    }

    pub fn backoff(&self, kind: FailureKind) -> &Backoff {
        match kind {
            FailureKind::Network => &self.network,
            FailureKind::Http => &self.http,
            FailureKind::RateLimited => &self.rate_limited,
        }
    }
}

/// The reconnect budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    /// The last delay that was applied
    pub timeout: Duration,
    /// Reconnect attempts made since the last successful connection
    pub retries: u32,
}

/// Tracks attempts against a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
    streak: u32,
    last_kind: Option<FailureKind>,
    last_delay: Duration,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            streak: 0,
            last_kind: None,
            last_delay: Duration::ZERO,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Attempts made since the last successful connection
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget all failures after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.streak = 0;
        self.last_kind = None;
        self.last_delay = Duration::ZERO;
    }

    /// Delay to wait before reconnecting after a failure of `kind`.
    ///
    /// A change of failure class restarts that class's schedule but not the
    /// overall budget.
    pub fn next_delay(&mut self, kind: FailureKind) -> Result<Duration, Exhausted> {
        if self.attempts >= self.policy.max_reconnects {
            return Err(Exhausted {
                timeout: self.last_delay,
                retries: self.attempts,
            });
        }

        if self.last_kind != Some(kind) {
            self.streak = 0;
            self.last_kind = Some(kind);
        }
        self.streak += 1;
        self.attempts += 1;
        self.last_delay = self.policy.backoff(kind).delay(self.streak);
        Ok(self.last_delay)
    }
}
