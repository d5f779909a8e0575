//! The acquisition loop: one session, one timebase, one transport.

use crate::config::SamplingConfig;
use crate::encoder::{self, HEADER};
use crate::error::TelemetryError;
use crate::sampler;
use crate::scheduler::{Idle, LoopStats, Scheduler};
use crate::timebase::{Timebase, Timestamp};
use crate::transport::{is_dropped_frame, Transport};
use std::fmt;
use std::io::Write;
use telemetry_traits::{BusConfig, DeviceError, DeviceSession};
use tracing::{debug, error, info, warn};

/// Written to the transport when the device never shows up. Contains no digits,
/// so line parsers looking for numbers will not mistake it for a sample.
pub const NOT_DETECTED_MESSAGE: &str = "No IMU detected. Check wiring or bus address!\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    /// Terminal. Nothing is sampled or written after this.
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Outcome of a single call to [`Streamer::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Period not yet elapsed.
    Waiting,
    /// A record stamped with this timestamp was written.
    Emitted(Timestamp),
    /// The device read failed; no record this period.
    Skipped,
    /// The transport timed out; the record was lost.
    Dropped,
}

pub struct Streamer<S, T, W: Write> {
    state: SessionState,
    session: Option<S>,
    timebase: T,
    transport: Transport<W>,
    scheduler: Scheduler,
    idle: Idle,
    stats: LoopStats,
}

impl<S, T, W> Streamer<S, T, W>
where
    S: DeviceSession,
    T: Timebase,
    W: Write,
{
    pub fn new(timebase: T, transport: Transport<W>, period_us: u32, idle: Idle) -> Self {
        let scheduler = Scheduler::new(period_us, timebase.now());
        Streamer {
            state: SessionState::Uninitialized,
            session: None,
            timebase,
            transport,
            scheduler,
            idle,
            stats: LoopStats::default(),
        }
    }

    pub fn from_config(
        timebase: T,
        transport: Transport<W>,
        sampling: &SamplingConfig,
    ) -> Result<Self, TelemetryError> {
        Ok(Self::new(timebase, transport, sampling.period_us()?, sampling.idle()?))
    }

    /// Opens the device through its [`DeviceSession::open`].
    pub fn start(&mut self, bus: &BusConfig) -> Result<(), TelemetryError> {
        self.start_with(|| S::open(bus))
    }

    /// Brings the session up using `open`, which is called at most once.
    ///
    /// On success the header is written and the schedule starts from now. On
    /// failure the diagnostic line is written, the streamer is `Faulted` for
    /// good, and the device error is returned.
    pub fn start_with<F>(&mut self, open: F) -> Result<(), TelemetryError>
    where
        F: FnOnce() -> Result<S, DeviceError>,
    {
        if self.state != SessionState::Uninitialized {
            return Err(TelemetryError::NotReady(self.state));
        }

        let session = match open() {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "device bring-up failed, halting");
                self.state = SessionState::Faulted;
                if let Err(io) = self.transport.write_frame(NOT_DETECTED_MESSAGE.as_bytes()) {
                    warn!(error = %io, "could not report startup fault over transport");
                }
                return Err(TelemetryError::Startup(e));
            }
        };

        self.session = Some(session);
        self.state = SessionState::Ready;
        if let Err(e) = self.transport.write_frame(HEADER.as_bytes()) {
            self.state = SessionState::Faulted;
            return Err(TelemetryError::Transport(e));
        }
        self.scheduler = Scheduler::new(self.scheduler.period_us(), self.timebase.now());
        info!(period_us = self.scheduler.period_us(), "session ready, streaming");
        Ok(())
    }

    /// Polls the timebase once and runs a full sample-encode-write cycle if
    /// a period has elapsed.
    pub fn step(&mut self) -> Result<Tick, TelemetryError> {
        let session = match (self.state, self.session.as_mut()) {
            (SessionState::Ready, Some(session)) => session,
            _ => return Err(TelemetryError::NotReady(self.state)),
        };

        let Some(elapsed) = self.scheduler.poll(self.timebase.now()) else {
            return Ok(Tick::Waiting);
        };
        let period_us = self.scheduler.period_us();
        self.stats.record_fire(elapsed, period_us);
        if elapsed >= period_us.saturating_mul(2) {
            debug!(elapsed_us = elapsed, period_us, "behind schedule");
        }

        let record = match sampler::sample(session, &self.timebase) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "no sample this tick");
                self.stats.skipped += 1;
                return Ok(Tick::Skipped);
            }
        };

        match self.transport.write_frame(&encoder::encode(&record)) {
            Ok(()) => {
                self.stats.emitted += 1;
                Ok(Tick::Emitted(record.timestamp))
            }
            Err(e) if is_dropped_frame(&e) => {
                warn!(error = %e, "transport busy, frame dropped");
                self.stats.dropped += 1;
                Ok(Tick::Dropped)
            }
            Err(e) => {
                error!(error = %e, "transport failed, halting");
                self.state = SessionState::Faulted;
                Err(TelemetryError::Transport(e))
            }
        }
    }

    /// Steps forever. Returns only when the streamer can no longer make progress.
    pub fn run(&mut self) -> Result<(), TelemetryError> {
        loop {
            if self.step()? == Tick::Waiting {
                self.idle.wait();
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn transport(&self) -> &Transport<W> {
        &self.transport
    }

    pub fn session_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    pub fn into_transport(self) -> Transport<W> {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebase::ManualTimebase;
    use telemetry_traits::{Quaternion, Vector3};

    struct Still;

    impl DeviceSession for Still {
        fn open(_config: &BusConfig) -> Result<Self, DeviceError> {
            Ok(Still)
        }

        fn read_orientation(&mut self) -> Result<Quaternion, DeviceError> {
            Ok(Quaternion::IDENTITY)
        }

        fn read_angular_rate(&mut self) -> Result<Vector3, DeviceError> {
            Ok(Vector3::default())
        }
    }

    fn streamer(step: u32) -> Streamer<Still, ManualTimebase, Vec<u8>> {
        let timebase = ManualTimebase::new(Timestamp::from_micros(0), step);
        Streamer::new(timebase, Transport::new(Vec::new()), 1_000, Idle::Spin)
    }

    #[test]
    fn header_is_written_on_ready() {
        let mut s = streamer(1);
        assert_eq!(s.state(), SessionState::Uninitialized);
        s.start(&BusConfig::default()).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.transport().get_ref().as_slice(), HEADER.as_bytes());
    }

    #[test]
    fn step_before_start_is_refused() {
        let mut s = streamer(1);
        assert!(matches!(s.step(), Err(TelemetryError::NotReady(SessionState::Uninitialized))));
    }

    #[test]
    fn second_start_is_refused() {
        let mut s = streamer(1);
        s.start(&BusConfig::default()).unwrap();
        assert!(matches!(
            s.start(&BusConfig::default()),
            Err(TelemetryError::NotReady(SessionState::Ready))
        ));
    }

    #[test]
    fn emits_once_period_elapses() {
        // Each read of the timebase advances it by 250 us.
        let mut s = streamer(250);
        s.start(&BusConfig::default()).unwrap();
        let mut ticks = Vec::new();
        for _ in 0..5 {
            ticks.push(s.step().unwrap());
        }
        assert_eq!(ticks[..3], [Tick::Waiting, Tick::Waiting, Tick::Waiting]);
        assert!(matches!(ticks[3], Tick::Emitted(_)));
        assert_eq!(s.stats().emitted, 1);
    }

    #[test]
    fn zero_rate_config_is_rejected() {
        let sampling = SamplingConfig { rate_hz: 0, ..Default::default() };
        let timebase = ManualTimebase::new(Timestamp::default(), 1);
        let result: Result<Streamer<Still, _, _>, _> =
            Streamer::from_config(timebase, Transport::new(Vec::new()), &sampling);
        assert!(matches!(result, Err(TelemetryError::Config(_))));
    }

    #[test]
    fn fault_message_has_no_digits() {
        assert!(!NOT_DETECTED_MESSAGE.chars().any(|c| c.is_ascii_digit()));
        assert!(NOT_DETECTED_MESSAGE.ends_with('\n'));
    }
}
