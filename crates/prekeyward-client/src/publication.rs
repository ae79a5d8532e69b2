//! Publication debouncing.
//!
//! Many things hint that an account's published material may be stale:
//! connecting, a low storage report, a consumed ensemble, the host asking.
//! [`PublicationScheduler`] folds every hint arriving inside one window into
//! a single deadline per account; when it passes, the client re-checks what
//! actually needs publishing.

use std::{collections::BTreeMap, ops::Add, time::Duration};

/// One-shot debounce timers keyed by account.
#[derive(Debug, Clone)]
pub struct PublicationScheduler<I> {
    delay: Duration,
    timers: BTreeMap<String, I>,
}

impl<I> PublicationScheduler<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Scheduler firing `delay` after the first trigger of a window.
    pub fn new(delay: Duration) -> Self {
        Self { delay, timers: BTreeMap::new() }
    }

    /// Debounce window.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the timer for `account` unless it is already armed.
    ///
    /// Returns true if this call armed it.
    pub fn trigger(&mut self, account: &str, now: I) -> bool {
        if self.timers.contains_key(account) {
            return false;
        }
        self.timers.insert(account.to_string(), now + self.delay);
        true
    }

    /// Whether a timer is armed for `account`.
    pub fn is_scheduled(&self, account: &str) -> bool {
        self.timers.contains_key(account)
    }

    /// Disarm `account`'s timer. Returns true if one was armed.
    pub fn cancel(&mut self, account: &str) -> bool {
        self.timers.remove(account).is_some()
    }

    /// Disarm and return every account whose deadline is at or before `now`,
    /// in account order.
    pub fn take_due(&mut self, now: I) -> Vec<String> {
        let due: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(account, _)| account.clone())
            .collect();

        for account in &due {
            self.timers.remove(account);
        }
        due
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<I> {
        self.timers.values().min().copied()
    }
}
