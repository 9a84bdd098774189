//! Std clock and delay sources

use std::time::Instant;

use phylax_pal::{Clock, Delay};

/// Monotonic clock over `std::time::Instant`
pub struct StdClock {
    epoch: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn millis(&mut self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Real thread-sleeping delay
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(u64::from(us)));
    }
}

/// No-op delay for simulation runs where waiting buys nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDelay;

impl Delay for NullDelay {
    fn delay_us(&mut self, _us: u32) {}
}
