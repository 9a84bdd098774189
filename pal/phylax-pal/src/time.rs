//! Time abstraction
//!
//! The stack never blocks without a bound: every wait is a counted number
//! of [`Delay::delay_us`] polls or a deadline checked against
//! [`Clock::millis`].

/// Busy-wait delay source
pub trait Delay {
    /// Block for at least `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// Block for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }
}

/// Monotonic millisecond clock used for protocol deadlines
pub trait Clock {
    /// Milliseconds since an arbitrary epoch; must not go backwards
    fn millis(&mut self) -> u64;
}
