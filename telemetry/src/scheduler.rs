//! Period gate for the sampling loop.

use crate::timebase::Timestamp;
use std::thread;
use std::time::Duration;

/// Fires at most once per `period_us`, measured with wrapping arithmetic.
#[derive(Debug, Clone)]
pub struct Scheduler {
    period_us: u32,
    last_fire: Timestamp,
}

impl Scheduler {
    /// `last_fire` starts at `now`, so the first tick comes one period later.
    pub fn new(period_us: u32, now: Timestamp) -> Self {
        Scheduler { period_us, last_fire: now }
    }

    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    pub fn last_fire(&self) -> Timestamp {
        self.last_fire
    }

    /// Returns the elapsed time if a tick is due at `now`.
    ///
    /// A due tick moves `last_fire` to `now` here, before any work runs, so a
    /// tick whose work fails still counts and the schedule never bursts to
    /// catch up.
    pub fn poll(&mut self, now: Timestamp) -> Option<u32> {
        let elapsed = now.elapsed_since(self.last_fire);
        if elapsed >= self.period_us {
            self.last_fire = now;
            Some(elapsed)
        } else {
            None
        }
    }
}

/// What the loop does between polls of an idle timebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idle {
    Spin,
    Yield,
    Sleep(Duration),
}

impl Idle {
    pub fn wait(&self) {
        match self {
            Idle::Spin => std::hint::spin_loop(),
            Idle::Yield => thread::yield_now(),
            Idle::Sleep(duration) => thread::sleep(*duration),
        }
    }
}

/// Counters kept by the loop across its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub emitted: u64,
    pub skipped: u64,
    pub dropped: u64,
    /// Ticks that fired two or more periods after the previous one.
    pub late: u64,
    /// Worst observed `elapsed - period`, in microseconds.
    pub max_lateness_us: u32,
}

impl LoopStats {
    pub fn record_fire(&mut self, elapsed: u32, period_us: u32) {
        let lateness = elapsed.saturating_sub(period_us);
        if lateness >= period_us {
            self.late += 1;
        }
        self.max_lateness_us = self.max_lateness_us.max(lateness);
    }

    pub fn ticks(&self) -> u64 {
        self.emitted + self.skipped + self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_a_full_period_before_first_tick() {
        let mut scheduler = Scheduler::new(10_000, Timestamp::from_micros(500));
        assert_eq!(scheduler.poll(Timestamp::from_micros(10_499)), None);
        assert_eq!(scheduler.poll(Timestamp::from_micros(10_500)), Some(10_000));
        assert_eq!(scheduler.last_fire(), Timestamp::from_micros(10_500));
    }

    #[test]
    fn fires_across_counter_wrap() {
        let mut scheduler = Scheduler::new(20, Timestamp::from_micros(u32::MAX - 4));
        assert_eq!(scheduler.poll(Timestamp::from_micros(10)), None);
        assert_eq!(scheduler.poll(Timestamp::from_micros(15)), Some(20));
        assert_eq!(scheduler.poll(Timestamp::from_micros(34)), None);
        assert_eq!(scheduler.poll(Timestamp::from_micros(35)), Some(20));
    }

    #[test]
    fn late_tick_rebases_instead_of_bursting() {
        let mut scheduler = Scheduler::new(1_000, Timestamp::from_micros(0));
        // Stalled for five periods: one tick, not five.
        assert_eq!(scheduler.poll(Timestamp::from_micros(5_300)), Some(5_300));
        assert_eq!(scheduler.poll(Timestamp::from_micros(5_301)), None);
        assert_eq!(scheduler.poll(Timestamp::from_micros(6_300)), Some(1_000));
    }

    #[test]
    fn stats_track_lateness() {
        let mut stats = LoopStats::default();
        stats.record_fire(1_000, 1_000);
        stats.record_fire(1_250, 1_000);
        assert_eq!(stats.late, 0);
        stats.record_fire(2_000, 1_000);
        assert_eq!(stats.late, 1);
        assert_eq!(stats.max_lateness_us, 1_000);
    }
}
