//! Wall-clock abstraction.

use chrono::{Local, Timelike};

/// Source of the current time for pricing decisions.
pub trait Clock: Send + Sync {
    /// Current hour (0-23) in server local time.
    fn local_hour(&self) -> u32;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// A clock pinned to one local hour.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub hour: u32,
}

impl FixedClock {
    pub fn at_hour(hour: u32) -> Self {
        Self { hour: hour % 24 }
    }
}

impl Clock for FixedClock {
    fn local_hour(&self) -> u32 {
        self.hour
    }
}
