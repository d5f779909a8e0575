//! Free-running microsecond counter that wraps at 2^32.
//!
//! Timestamps are only ever compared through [`Timestamp::elapsed_since`], which
//! uses wrapping subtraction and therefore stays correct across the wrap.

use std::cell::Cell;
use std::fmt;
use std::time::Instant;

/// Microseconds on a counter that wraps from `u32::MAX` back to zero.
///
/// Deliberately not `Ord`: "later" only has meaning relative to another stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const fn from_micros(micros: u32) -> Self {
        Timestamp(micros)
    }

    pub const fn as_micros(self) -> u32 {
        self.0
    }

    /// Forward distance from `earlier` to `self` on the circular timeline.
    pub const fn elapsed_since(self, earlier: Timestamp) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    pub const fn wrapping_add(self, micros: u32) -> Timestamp {
        Timestamp(self.0.wrapping_add(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Timebase {
    fn now(&self) -> Timestamp;
}

impl<T: Timebase + ?Sized> Timebase for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Host timebase: microseconds since construction, truncated to 32 bits.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimebase {
    origin: Instant,
    offset: u32,
}

impl MonotonicTimebase {
    pub fn new() -> Self {
        Self::starting_at(Timestamp::default())
    }

    /// Starts the counter at `start` instead of zero. Useful for exercising
    /// the wrap without waiting 71 minutes.
    pub fn starting_at(start: Timestamp) -> Self {
        MonotonicTimebase { origin: Instant::now(), offset: start.as_micros() }
    }
}

impl Default for MonotonicTimebase {
    fn default() -> Self {
        Self::new()
    }
}

impl Timebase for MonotonicTimebase {
    fn now(&self) -> Timestamp {
        // Truncation is the modulus.
        let micros = self.origin.elapsed().as_micros() as u32;
        Timestamp(micros.wrapping_add(self.offset))
    }
}

/// Synthetic timebase that advances by a fixed step on every read.
#[derive(Debug)]
pub struct ManualTimebase {
    now: Cell<u32>,
    step: u32,
}

impl ManualTimebase {
    pub fn new(start: Timestamp, step: u32) -> Self {
        ManualTimebase { now: Cell::new(start.as_micros()), step }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.set(now.as_micros());
    }

    pub fn advance(&self, micros: u32) {
        self.now.set(self.now.get().wrapping_add(micros));
    }

    /// Current value without advancing.
    pub fn peek(&self) -> Timestamp {
        Timestamp(self.now.get())
    }
}

impl Timebase for ManualTimebase {
    fn now(&self) -> Timestamp {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        Timestamp(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn elapsed_across_wrap() {
        let last = Timestamp::from_micros(u32::MAX - 4);
        let now = Timestamp::from_micros(10);
        assert_eq!(now.elapsed_since(last), 15);
    }

    #[test]
    fn manual_timebase_steps_after_each_read() {
        let tb = ManualTimebase::new(Timestamp::from_micros(u32::MAX - 1), 2);
        assert_eq!(tb.now().as_micros(), u32::MAX - 1);
        assert_eq!(tb.now().as_micros(), 0);
        tb.advance(5);
        assert_eq!(tb.peek().as_micros(), 7);
    }

    #[test]
    fn monotonic_timebase_honours_offset() {
        let tb = MonotonicTimebase::starting_at(Timestamp::from_micros(u32::MAX));
        // At most a few microseconds have passed, so the counter has wrapped or is at MAX.
        let elapsed = tb.now().elapsed_since(Timestamp::from_micros(u32::MAX));
        assert!(elapsed < 1_000_000);
    }

    proptest! {
        #[test]
        fn elapsed_is_forward_distance(last in any::<u32>(), distance in any::<u32>()) {
            let last = Timestamp::from_micros(last);
            let now = last.wrapping_add(distance);
            prop_assert_eq!(now.elapsed_since(last), distance);
        }
    }
}
