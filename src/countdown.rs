//! Cancellable one-second countdown for pre-exposure
//!
//! The countdown holds no timer of its own. The host loop calls `tick` once
//! per second; cancelling simply stops it from reaching zero.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStatus {
    Running(u32),
    Finished,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    cancelled: bool,
}

impl Countdown {
    pub fn new(seconds: u32) -> Self {
        Self {
            total: seconds,
            remaining: seconds,
            cancelled: false,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn status(&self) -> CountdownStatus {
        if self.cancelled {
            CountdownStatus::Cancelled
        } else if self.remaining == 0 {
            CountdownStatus::Finished
        } else {
            CountdownStatus::Running(self.remaining)
        }
    }

    /// Advance by one second
    pub fn tick(&mut self) -> CountdownStatus {
        if !self.cancelled {
            self.remaining = self.remaining.saturating_sub(1);
        }
        self.status()
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status(), CountdownStatus::Running(_))
    }
}
