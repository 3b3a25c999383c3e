//! Bounded retry policies

use std::thread;
use std::time::Duration;

/// How many times an attempt may be made and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Pause after each failed attempt.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Lock contention: 120 attempts, 100 ms apart.
    pub const BUSY: RetryPolicy = RetryPolicy::new(120, Duration::from_millis(100));

    /// Schema drift: 10 attempts, retried immediately.
    pub const SCHEMA: RetryPolicy = RetryPolicy::new(10, Duration::ZERO);

    pub const fn new(max_attempts: usize, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn budget(&self) -> RetryBudget {
        RetryBudget { policy: *self, failures: 0 }
    }

    /// Repeat `attempt` until it returns [`Retry::Done`] or the budget is spent.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub fn run<T>(&self, mut attempt: impl FnMut(usize) -> Retry<T>) -> Result<T, Exhausted> {
        let mut budget = self.budget();
        loop {
            match attempt(budget.failures() + 1) {
                Retry::Done(value) => return Ok(value),
                Retry::Again => {
                    if !budget.record_failure() {
                        return Err(Exhausted { attempts: budget.failures() });
                    }
                }
            }
        }
    }
}

/// Result of one attempt under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retry<T> {
    Done(T),
    Again,
}

/// Every attempt allowed by the policy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: usize,
}

/// Failure counter for one policy within one statement execution.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    failures: usize,
}

impl RetryBudget {
    /// Count a failed attempt. Returns `false` once no attempts remain,
    /// otherwise sleeps for the policy interval and returns `true`.
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            return false;
        }
        if !self.policy.interval.is_zero() {
            thread::sleep(self.policy.interval);
        }
        true
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}
