//! Fixed-interval reconnect timer.
//!
//! There is no exponential backoff here: the wait is for someone to plug
//! the display back in.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    interval: Duration,
    next_attempt: Option<Instant>,
    /// Consecutive failed opens since the link was last up.
    failed_attempts: u32,
}

impl ReconnectSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_attempt: None,
            failed_attempts: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule the next attempt one interval from now.
    pub fn arm(&mut self) -> Instant {
        let at = Instant::now() + self.interval;
        self.next_attempt = Some(at);
        at
    }

    /// Cancel any pending attempt and forget past failures.
    pub fn disarm(&mut self) {
        self.next_attempt = None;
        self.failed_attempts = 0;
    }

    /// Consume the pending attempt (the timer fired).
    pub fn take(&mut self) -> Option<Instant> {
        self.next_attempt.take()
    }

    pub fn is_armed(&self) -> bool {
        self.next_attempt.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_attempt
    }

    /// Count a failed open; returns the running total.
    pub fn record_failure(&mut self) -> u32 {
        self.failed_attempts += 1;
        self.failed_attempts
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }
}
