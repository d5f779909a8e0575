//! Fixed-rate IMU telemetry.
//!
//! A [`Streamer`] owns one [`DeviceSession`], one [`Timebase`] and one
//! [`Transport`]. Once the session is ready it writes the CSV header, then one
//! line per elapsed period:
//!
//! ```text
//! Timestamp, Q.W, Q.X, Q.Y, Q.Z, W.X, W.Y, W.Z
//! 1000,1.00000000,0.00000000,0.00000000,0.00000000,0.00000000,0.00000000,0.00000000
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod receiver;
pub mod sampler;
pub mod scheduler;
pub mod sim;
pub mod streamer;
pub mod timebase;
pub mod transport;

pub use config::{ConfigError, IdleStrategy, TelemetryConfig};
pub use error::TelemetryError;
pub use sampler::TelemetryRecord;
pub use scheduler::{Idle, LoopStats, Scheduler};
pub use sim::SimulatedImu;
pub use streamer::{SessionState, Streamer, Tick};
pub use telemetry_traits::{BusConfig, DeviceError, DeviceSession, Quaternion, Vector3};
pub use timebase::{ManualTimebase, MonotonicTimebase, Timebase, Timestamp};
pub use transport::Transport;

#[cfg(target_os = "linux")]
pub use linux_bno055::Bno055;
