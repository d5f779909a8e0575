use crate::timebase::{Timebase, Timestamp};
use telemetry_traits::{DeviceError, DeviceSession, Quaternion, Vector3};

/// One tick's worth of data. Consumed by the encoder and then dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    pub timestamp: Timestamp,
    pub orientation: Quaternion,
    /// rad/s
    pub angular_rate: Vector3,
}

/// Reads orientation, then angular rate, from `session`.
///
/// The timestamp is taken before either read, so it marks when the sample was
/// requested. The two reads are separate bus transactions and are not
/// guaranteed to come from the same fusion cycle.
pub fn sample<S, T>(session: &mut S, timebase: &T) -> Result<TelemetryRecord, DeviceError>
where
    S: DeviceSession + ?Sized,
    T: Timebase + ?Sized,
{
    let timestamp = timebase.now();
    let orientation = session.read_orientation()?;
    let angular_rate = session.read_angular_rate()?;
    Ok(TelemetryRecord { timestamp, orientation, angular_rate })
}
