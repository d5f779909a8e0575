use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// --- Basic Types ---
/// Angular rate about the sensor-fixed axes (rad/s).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

/// Orientation as a unit quaternion (WXYZ order). The sensor is trusted for the norm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Quaternion { w, x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

impl fmt::Display for Quaternion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quaternion(w={}, x={}, y={}, z={})", self.w, self.x, self.y, self.z)
    }
}

// --- Bus Configuration ---
/// Where and how to reach the sensing peripheral. Passed through to `DeviceSession::open`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus device path (e.g. "/dev/i2c-1")
    pub path: String,
    /// 7-bit device address
    pub address: u16,
    /// Bus clock rate in Hz. Set by the platform; sessions only report it.
    pub clock_hz: u32,
    /// Try to switch the device onto its external timing reference.
    pub external_crystal: bool,
    /// Upper bound on the detect/settle loop inside `open`.
    pub open_timeout_ms: u64,
}

impl BusConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            path: "/dev/i2c-1".to_string(),
            address: 0x28,
            clock_hz: 400_000,
            external_crystal: true,
            open_timeout_ms: 1000,
        }
    }
}

// --- Standard Error Type ---
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device never acknowledged on the bus, or answered with the wrong identity
    #[error("device not detected: {0}")]
    DeviceNotDetected(String),
    /// A read after a successful `open` failed; the sample is lost, the session is not
    #[error("transient read failure: {0}")]
    TransientReadFailure(String),
    /// The device answered but rejected part of its bring-up sequence
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl DeviceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::TransientReadFailure(_))
    }
}

/// A sensing peripheral that can report orientation and angular rate.
///
/// `open` performs the whole bring-up (detection, fusion mode, optional external
/// clock). Once it returns, both reads must be usable.
pub trait DeviceSession {
    fn open(config: &BusConfig) -> Result<Self, DeviceError>
    where
        Self: Sized;

    /// Orientation as a unit quaternion.
    fn read_orientation(&mut self) -> Result<Quaternion, DeviceError>;

    /// Angular rate in rad/s.
    fn read_angular_rate(&mut self) -> Result<Vector3, DeviceError>;
}
