//! Host clock adapter.
//!
//! Implements [`Clock`]: monotonic milliseconds since construction from
//! `std::time::Instant`, wall-clock milliseconds from `SystemTime`.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::app::ports::Clock;

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// 0 if the system clock is set before 1970.
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
