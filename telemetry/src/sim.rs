//! A stand-in device for running the streamer without hardware.

use std::time::Instant;
use telemetry_traits::{BusConfig, DeviceError, DeviceSession, Quaternion, Vector3};
use tracing::info;

/// Yaw rate used when opened through [`DeviceSession::open`], rad/s.
pub const DEFAULT_YAW_RATE: f64 = 0.5;

/// Spins about its z axis at a constant rate.
#[derive(Debug, Clone)]
pub struct SimulatedImu {
    origin: Instant,
    yaw_rate: f64,
    fail_every: Option<u32>,
    reads: u32,
}

impl SimulatedImu {
    pub fn new(yaw_rate: f64) -> Self {
        SimulatedImu { origin: Instant::now(), yaw_rate, fail_every: None, reads: 0 }
    }

    /// Makes every `n`th orientation read fail as a transient error.
    pub fn with_dropouts(mut self, n: u32) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Rotation after `seconds` of spinning.
    pub fn orientation_at(&self, seconds: f64) -> Quaternion {
        let half = self.yaw_rate * seconds / 2.0;
        Quaternion::new(half.cos(), 0.0, 0.0, half.sin())
    }
}

impl DeviceSession for SimulatedImu {
    fn open(config: &BusConfig) -> Result<Self, DeviceError> {
        info!(bus = %config.path, "using simulated IMU");
        Ok(SimulatedImu::new(DEFAULT_YAW_RATE))
    }

    fn read_orientation(&mut self) -> Result<Quaternion, DeviceError> {
        self.reads = self.reads.wrapping_add(1);
        if let Some(n) = self.fail_every {
            if self.reads % n == 0 {
                return Err(DeviceError::TransientReadFailure(format!(
                    "simulated dropout on read {}",
                    self.reads
                )));
            }
        }
        Ok(self.orientation_at(self.origin.elapsed().as_secs_f64()))
    }

    fn read_angular_rate(&mut self) -> Result<Vector3, DeviceError> {
        Ok(Vector3::new(0.0, 0.0, self.yaw_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn half_turn_about_z() {
        let imu = SimulatedImu::new(PI);
        let q = imu.orientation_at(1.0);
        assert!(q.w.abs() < 1e-12);
        assert!((q.z - 1.0).abs() < 1e-12);
        assert!((q.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dropouts_are_periodic() {
        let mut imu = SimulatedImu::new(0.0).with_dropouts(3);
        let failures: Vec<bool> = (0..6).map(|_| imu.read_orientation().is_err()).collect();
        assert_eq!(failures, [false, false, true, false, false, true]);
        assert_eq!(imu.read_angular_rate().unwrap(), Vector3::default());
    }
}
