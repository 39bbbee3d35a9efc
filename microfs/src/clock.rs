//! Time source and bounded retries.
//!
//! Everything in the protocol layer that waits goes through a [`Clock`], so
//! tests can substitute a clock whose `sleep` advances virtual time instead
//! of blocking.

use crate::error::Result;
use log::warn;
use std::time::{Duration, Instant};

/// Source of the current time and of blocking sleeps.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A point in time after which a wait gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(clock: &dyn Clock, timeout: Duration) -> Self {
        Self {
            at: clock.now() + timeout,
        }
    }

    /// Whether the deadline has passed.
    pub fn expired(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.at
    }
}

/// Fixed-count retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: usize,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with `max_attempts` attempts and no delay.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    /// Run `attempt` until it yields a value or the budget is spent.
    ///
    /// The closure receives the 1-based attempt number and returns
    /// `Ok(Some(v))` on success, `Ok(None)` to ask for another attempt, or
    /// `Err` to abort immediately. Exhausting the budget returns `Ok(None)`.
    pub fn run<T, F>(&self, clock: &dyn Clock, mut attempt: F) -> Result<Option<T>>
    where
        F: FnMut(usize) -> Result<Option<T>>,
    {
        for n in 1..=self.max_attempts {
            if let Some(value) = attempt(n)? {
                return Ok(Some(value));
            }
            if n < self.max_attempts {
                warn!("Attempt {n}/{} failed, retrying", self.max_attempts);
                if !self.delay.is_zero() {
                    clock.sleep(self.delay);
                }
            }
        }
        Ok(None)
    }
}
